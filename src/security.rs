//! Application signature check
//!
//! Anti-tamper precondition gating every master-secret access. The signature
//! value itself is loaded by the bootstrap layer (environment/config) and
//! handed in at construction; development builds skip the check.

/// Signature validation errors
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Application signature is not loaded")]
    SignatureMissing,
}

/// Security configuration supplied by the bootstrap layer.
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    app_signature: Option<String>,
    development: bool,
}

impl SecurityConfig {
    /// Production configuration with the given application signature.
    pub fn new(app_signature: Option<String>) -> Self {
        Self {
            app_signature,
            development: false,
        }
    }

    /// Development configuration; signature validation always passes.
    pub fn development() -> Self {
        Self {
            app_signature: None,
            development: true,
        }
    }

    pub fn app_signature(&self) -> Option<&str> {
        self.app_signature.as_deref()
    }

    /// Validate the application signature.
    ///
    /// Any non-empty signature is currently accepted; stricter verification
    /// (binary hash, code signature) belongs to the bootstrap layer.
    pub fn validate_signature(&self) -> Result<(), SecurityError> {
        if self.development {
            return Ok(());
        }

        match self.app_signature.as_deref() {
            Some(sig) if !sig.is_empty() => Ok(()),
            _ => Err(SecurityError::SignatureMissing),
        }
    }
}
