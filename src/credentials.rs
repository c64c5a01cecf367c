use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const REQUIRED_KEYS: [&str; 4] = ["url", "token", "org", "bucket"];

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("credentials incomplete, missing keys: {}", .keys.join(", "))]
    Missing { keys: Vec<&'static str> },
}

impl Credentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path_ref = path.as_ref();
        let text = fs::read_to_string(path_ref).map_err(|source| CredentialError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    // Later keys win; an empty value counts as missing.
    pub fn parse(text: &str) -> Result<Self, CredentialError> {
        let mut values: HashMap<&str, &str> = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            values.insert(key.trim(), value.trim());
        }

        let missing: Vec<&'static str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| values.get(k).map_or(true, |v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(CredentialError::Missing { keys: missing });
        }

        let get = |key: &str| values.get(key).copied().unwrap_or_default().to_string();
        Ok(Self {
            url: get("url").trim_end_matches('/').to_string(),
            token: get("token"),
            org: get("org"),
            bucket: get("bucket"),
        })
    }
}
