use thiserror::Error;

/// Session credential attached to backend calls as `Authorization: Bearer`.
///
/// `Debug` is manually implemented to redact the value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

#[derive(Debug, Error)]
#[error("bearer token must not be empty")]
pub struct EmptyTokenError;

impl BearerToken {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyTokenError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(EmptyTokenError);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Builds a token from an optional raw value, treating blank as absent.
    #[must_use]
    pub fn from_optional(value: Option<&str>) -> Option<Self> {
        value.and_then(|raw| Self::new(raw).ok())
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Header value for `Authorization`.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BearerToken(<redacted>)")
    }
}
