use chrono::{DateTime, Utc};
use common::{Error, Result};
use serde::Serialize;

const MAX_KEY_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HandleMethod {
    Put,
    Get,
}

impl HandleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleMethod::Put => "PUT",
            HandleMethod::Get => "GET",
        }
    }
}

/// A validated object key: one exact object, never a prefix or pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::InvalidInput("fileName is required".into()));
        }
        if raw.len() > MAX_KEY_BYTES {
            return Err(Error::InvalidInput(format!(
                "fileName exceeds {} bytes",
                MAX_KEY_BYTES
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(Error::InvalidInput(
                "fileName must not contain control characters".into(),
            ));
        }
        if raw.starts_with('/') {
            return Err(Error::InvalidInput("fileName must not start with '/'".into()));
        }
        if raw.split('/').any(|segment| segment == ".." || segment == ".") {
            return Err(Error::InvalidInput(
                "fileName must not contain relative path segments".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedHandle {
    pub url: String,
    pub method: HandleMethod,
    pub object_key: String,
    pub expiry: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_and_nested_keys() {
        assert_eq!(ObjectKey::parse("a.csv").unwrap().as_str(), "a.csv");
        assert_eq!(
            ObjectKey::parse("2024/q1/report 1.csv").unwrap().as_str(),
            "2024/q1/report 1.csv"
        );
    }

    #[test]
    fn test_rejects_unscoped_keys() {
        for raw in ["", "   ", "/etc/passwd", "a/../b.csv", "./a.csv", "a\nb.csv"] {
            let err = ObjectKey::parse(raw).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "accepted {:?}", raw);
        }
        assert!(ObjectKey::parse(&"k".repeat(1025)).is_err());
    }
}
