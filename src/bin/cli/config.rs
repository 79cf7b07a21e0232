use gql_cypher::TranslatorOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Named schema/options pair selectable with `--profile`.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub schema: Option<PathBuf>,
    pub options: TranslatorOptions,
}

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        if let Some(default_name) = data.default_profile.as_ref() {
            if !data.profiles.contains_key(default_name) {
                return Err(ConfigError::ProfileNotFound {
                    name: default_name.clone(),
                });
            }
        }
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Resolves `name`, or the default profile, over the top-level settings.
    pub fn profile(&self, name: Option<&str>) -> Result<Profile, ConfigError> {
        let name = name.or(self.data.default_profile.as_deref());
        let Some(name) = name else {
            return Ok(Profile {
                name: "default".to_string(),
                schema: self.data.schema.clone(),
                options: self.data.translator.clone(),
            });
        };
        let raw = self
            .data
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })?;
        Ok(Profile {
            name: name.to_string(),
            schema: raw.schema.clone().or_else(|| self.data.schema.clone()),
            options: raw
                .translator
                .clone()
                .unwrap_or_else(|| self.data.translator.clone()),
        })
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.data.profiles.keys().map(String::as_str)
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    schema: Option<PathBuf>,
    #[serde(default)]
    translator: TranslatorOptions,
    #[serde(default)]
    profiles: BTreeMap<String, RawProfile>,
    #[serde(default)]
    default_profile: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    schema: Option<PathBuf>,
    translator: Option<TranslatorOptions>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("gqlcypher").join("cli.toml"))
}
