//! Environment variable credentials provider.

use super::{AwsCredentials, CredentialsProvider};
use crate::error::{CredentialsError, S3Error};
use async_trait::async_trait;
use std::env;

/// Access key ID variable.
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// Secret access key variable.
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// Session token variable.
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Reads credentials from environment variables on every call.
///
/// Defaults to `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
/// `AWS_SESSION_TOKEN`; other variable names can be configured.
#[derive(Debug, Clone)]
pub struct EnvCredentialsProvider {
    access_key_var: String,
    secret_key_var: String,
    session_token_var: String,
}

impl Default for EnvCredentialsProvider {
    fn default() -> Self {
        Self::with_vars(AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN)
    }
}

impl EnvCredentialsProvider {
    /// Create a provider using the standard variable names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider with custom variable names.
    pub fn with_vars(
        access_key_var: impl Into<String>,
        secret_key_var: impl Into<String>,
        session_token_var: impl Into<String>,
    ) -> Self {
        Self {
            access_key_var: access_key_var.into(),
            secret_key_var: secret_key_var.into(),
            session_token_var: session_token_var.into(),
        }
    }

    fn required(name: &str) -> Result<String, S3Error> {
        match env::var(name) {
            Ok(value) if value.is_empty() => Err(S3Error::Credentials(CredentialsError::Invalid {
                message: format!("{} is empty", name),
            })),
            Ok(value) => Ok(value),
            Err(_) => Err(S3Error::Credentials(CredentialsError::NotFound)),
        }
    }
}

#[async_trait]
impl CredentialsProvider for EnvCredentialsProvider {
    async fn get_credentials(&self) -> Result<AwsCredentials, S3Error> {
        let access_key_id = Self::required(&self.access_key_var)?;
        let secret_access_key = Self::required(&self.secret_key_var)?;

        let credentials = match env::var(&self.session_token_var)
            .ok()
            .filter(|s| !s.is_empty())
        {
            Some(token) => {
                AwsCredentials::with_session_token(access_key_id, secret_access_key, token)
            }
            None => AwsCredentials::new(access_key_id, secret_access_key),
        };

        Ok(credentials)
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}
