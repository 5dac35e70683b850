//! Secret resolution from multiple sources.
//!
//! Sources are tried in priority order:
//!
//! 1. **Direct value** - for quick local testing (`"apiKey": "..."`)
//! 2. **File reference** - for the Docker secrets pattern (`"apiKeyFile": "/run/secrets/gemini"`)
//! 3. **Env var reference** - for production (`"apiKeyEnvVar": "GEMINI_API_KEY"`)

use std::fmt;
use std::fs;

use secrecy::SecretString;

use crate::config::expand_home;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: SecretSource },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where a resolved secret came from. Safe to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    Direct,
    File(String),
    EnvVar(String),
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Direct => f.write_str("config value"),
            SecretSource::File(path) => write!(f, "file {}", path),
            SecretSource::EnvVar(name) => write!(f, "env var {}", name),
        }
    }
}

/// Resolves a secret from the first non-empty source: direct value, file
/// contents, then environment variable. File and env values are trimmed.
///
/// ```ignore
/// use repaircode::secrets::resolve_secret;
///
/// let key = resolve_secret(None, Some("~/.secrets/gemini"), Some("GEMINI_API_KEY"))?;
/// ```
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    resolve_secret_with_source(direct, file_path, env_var).map(|(secret, _)| secret)
}

/// Like [`resolve_secret`], also reporting which source was used.
///
/// A source that is selected but yields only whitespace is an error rather
/// than a fall-through, so a truncated secrets file is noticed.
pub fn resolve_secret_with_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<(SecretString, SecretSource)> {
    if let Some(value) = non_empty(direct) {
        return Ok((SecretString::from(value.to_string()), SecretSource::Direct));
    }

    if let Some(path) = non_empty(file_path) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        return checked(content.trim(), SecretSource::File(expanded));
    }

    if let Some(name) = non_empty(env_var) {
        let value = std::env::var(name).map_err(|e| match e {
            std::env::VarError::NotPresent => SecretError::EnvVarNotSet {
                name: name.to_string(),
            },
            std::env::VarError::NotUnicode(_) => SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            },
        })?;
        return checked(value.trim(), SecretSource::EnvVar(name.to_string()));
    }

    Err(SecretError::NoSourceProvided)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn checked(value: &str, source: SecretSource) -> Result<(SecretString, SecretSource)> {
    if value.is_empty() {
        return Err(SecretError::Empty { origin: source });
    }
    Ok((SecretString::from(value.to_string()), source))
}
