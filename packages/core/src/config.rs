//! Per-request mount configuration.
//!
//! The host passes a flat JSON object with the backend name, its parameters
//! and base64-encoded secrets under `kubernetes.io/secret/<name>`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use snafu::ResultExt;

use crate::error::{ConfigDecodeSnafu, Error, Result, SecretDecodeSnafu};

/// Key naming the backend scheme.
pub const BACKEND_KEY: &str = "kuberlabFS";

/// Prefix of secret entries.
pub const SECRET_PREFIX: &str = "kubernetes.io/secret/";

/// Mount options decoded from the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MountConfig {
    values: Map<String, Value>,
}

impl MountConfig {
    /// Decodes the JSON object passed on the command line.
    pub fn parse(raw: &str) -> Result<Self> {
        let values: Map<String, Value> = serde_json::from_str(raw).context(ConfigDecodeSnafu)?;
        Ok(Self { values })
    }

    /// The declared backend scheme.
    pub fn scheme(&self) -> Result<&str> {
        match self.values.get(BACKEND_KEY) {
            None | Some(Value::Null) => Err(Error::MissingBackend),
            Some(Value::String(s)) if s.is_empty() => Err(Error::MissingBackend),
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(Error::InvalidConfig {
                message: "not supported FS type format".to_string(),
            }),
        }
    }

    /// The value of `key` rendered as text.
    ///
    /// Strings are returned as-is, other scalars in their JSON form. Null and
    /// empty strings count as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Like [`MountConfig::get`], failing when the key is absent.
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| Error::MissingParameter {
            key: key.to_string(),
        })
    }

    /// Returns true if the secret `name` is present.
    pub fn has_secret(&self, name: &str) -> bool {
        self.values.contains_key(&format!("{SECRET_PREFIX}{name}"))
    }

    /// Decodes the secret `name`.
    pub fn secret(&self, name: &str) -> Result<String> {
        let value = self
            .values
            .get(&format!("{SECRET_PREFIX}{name}"))
            .ok_or_else(|| Error::SecretMissing {
                name: name.to_string(),
            })?;
        let Value::String(encoded) = value else {
            return Err(Error::SecretInvalid {
                name: name.to_string(),
            });
        };
        let bytes = STANDARD.decode(encoded).context(SecretDecodeSnafu { name })?;
        let decoded = String::from_utf8_lossy(&bytes);
        Ok(decoded.trim_matches('\n').trim_matches('\r').to_string())
    }

    /// Decodes the secret `name` if it is present.
    pub fn optional_secret(&self, name: &str) -> Result<Option<String>> {
        if self.has_secret(name) {
            self.secret(name).map(Some)
        } else {
            Ok(None)
        }
    }
}
