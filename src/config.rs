//! Options that shape translation for a served schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Translator-wide options, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslatorOptions {
    /// Reject unauthenticated requests before translation starts.
    pub require_authentication: bool,
    /// Emit change-event metadata from delete operations.
    pub track_change_events: bool,
    /// Limit applied to top-level reads that omit one.
    pub default_limit: Option<u64>,
    /// Upper bound applied to every requested limit.
    pub max_limit: Option<u64>,
    /// Claim resolution settings for authorization rules.
    pub authorization: AuthorizationSettings,
}

/// Claim resolution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorizationSettings {
    /// Maps a claim field name used in rules to its dotted path inside the
    /// decoded token, e.g. `roles -> "https://example.com/claims.roles"`.
    pub claim_paths: BTreeMap<String, String>,
}

impl TranslatorOptions {
    /// Builder-style helper toggling change-event tracking.
    pub fn with_change_events(mut self, enabled: bool) -> Self {
        self.track_change_events = enabled;
        self
    }

    /// Builder-style helper setting default and max limits.
    pub fn with_limits(mut self, default: Option<u64>, max: Option<u64>) -> Self {
        self.default_limit = default;
        self.max_limit = max;
        self
    }
}
