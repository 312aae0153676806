//! Token validation boundary.
//!
//! The worker only consumes "validate token → subject id"; issuer
//! discovery, signature verification, and claim checking live in the
//! external validator behind this trait.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::foundation::error::{FeedforgeError, FeedforgeResult};

#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate an access token and return the subject id it belongs to.
    async fn validate(&self, token: &str) -> FeedforgeResult<String>;
}

/// Fixed token → subject table for tests and local runs.
#[derive(Default)]
pub struct StaticTokenValidator {
    subjects: HashMap<String, String>,
}

impl StaticTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, subject_id: &str) -> Self {
        self.subjects.insert(token.to_string(), subject_id.to_string());
        self
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> FeedforgeResult<String> {
        if token.is_empty() {
            return Err(FeedforgeError::auth("access token cannot be empty"));
        }
        self.subjects
            .get(token)
            .cloned()
            .ok_or_else(|| FeedforgeError::auth("access token rejected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_maps_to_subject() {
        let validator = StaticTokenValidator::new().with_token("tok-1", "auth0|alice");
        assert_eq!(validator.validate("tok-1").await.unwrap(), "auth0|alice");
    }

    #[tokio::test]
    async fn unknown_or_empty_tokens_are_rejected() {
        let validator = StaticTokenValidator::new();
        assert!(matches!(
            validator.validate("nope").await,
            Err(FeedforgeError::Auth(_))
        ));
        assert!(matches!(
            validator.validate("").await,
            Err(FeedforgeError::Auth(_))
        ));
    }
}
