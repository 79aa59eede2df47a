use std::fmt;

/// Error from a storage backend.
///
/// Backends differ in what can go wrong; the replication layer only needs
/// the message. The one condition every backend reports the same way is a
/// `get` on a missing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    message: String,
}

impl StorageError {
    /// An error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error reported when `get` finds no value under `key`.
    pub fn missing_key(key: &str) -> Self {
        Self::new(format!("no value stored under key '{key}'"))
    }

    /// The backend's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage error: {}", self.message)
    }
}

impl std::error::Error for StorageError {}
