#![forbid(unsafe_code)]

//! Per-request authorization context.
//!
//! The context is produced by an external token-decode step. It carries the
//! authentication flag and the decoded claims; claim-path remapping comes
//! from [`AuthorizationSettings`] and is resolved once when the context is
//! built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::config::{AuthorizationSettings, TranslatorOptions};
use crate::error::{Result, TranslateError};
use crate::query::Value;

/// Authentication state and claims for one request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    /// Whether a verified token accompanied the request.
    pub is_authenticated: bool,
    /// Decoded token claims.
    #[serde(default)]
    pub claims: Map<String, Json>,
    #[serde(skip)]
    claim_paths: BTreeMap<String, String>,
}

impl AuthContext {
    /// Unauthenticated request without claims.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Authenticated request carrying `claims`.
    pub fn authenticated(claims: Map<String, Json>) -> Self {
        Self {
            is_authenticated: true,
            claims,
            claim_paths: BTreeMap::new(),
        }
    }

    /// Applies claim-path remapping from configuration.
    pub fn with_claim_paths(mut self, settings: &AuthorizationSettings) -> Self {
        self.claim_paths = settings.claim_paths.clone();
        self
    }

    /// Fails with `Unauthenticated` when options demand a token and the
    /// request carries none.
    pub fn require_authenticated(&self, options: &TranslatorOptions) -> Result<()> {
        if options.require_authentication && !self.is_authenticated {
            return Err(TranslateError::Unauthenticated);
        }
        Ok(())
    }

    /// Dotted path a rule's claim field resolves to.
    pub fn claim_path<'a>(&'a self, field: &'a str) -> &'a str {
        self.claim_paths
            .get(field)
            .map(String::as_str)
            .unwrap_or(field)
    }

    /// Looks up a claim by rule field name, following remapping and dotted
    /// paths. `a\.b` addresses a key that itself contains a dot.
    pub fn claim(&self, field: &str) -> Option<&Json> {
        let path = self.claim_path(field);
        if let Some(value) = self.claims.get(path) {
            return Some(value);
        }
        let mut segments = split_path(path).into_iter();
        let first = segments.next()?;
        let mut current = self.claims.get(&first)?;
        for segment in segments {
            current = current.as_object()?.get(&segment)?;
        }
        Some(current)
    }

    /// Claims as a parameter value.
    pub fn jwt_value(&self) -> Value {
        Value::from_json(&Json::Object(self.claims.clone()))
    }
}

/// Splits a dotted claim path, honouring `\.` escapes.
pub fn split_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}
