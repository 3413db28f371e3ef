use anyhow::{Context, Result, anyhow};

use super::KeyStore;

/// Reads tokens from environment variables (including values loaded from `.env`).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvKeyStore;

#[async_trait::async_trait]
impl KeyStore for EnvKeyStore {
    async fn get(&self, var: &str) -> Result<String> {
        std::env::var(var).with_context(|| format!("environment variable '{var}' not set"))
    }
}

/// Reads tokens from AWS SSM Parameter Store, decrypting `SecureString`s.
///
/// Needs `ssm:GetParameter` plus the matching KMS permission on the key.
pub struct SsmKeyStore {
    client: aws_sdk_ssm::Client,
}

impl SsmKeyStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
        }
    }

    /// Uses the ambient AWS configuration (env vars, profile, instance role).
    pub async fn from_env() -> Self {
        Self::new(&aws_config::load_from_env().await)
    }
}

#[async_trait::async_trait]
impl KeyStore for SsmKeyStore {
    async fn get(&self, parameter: &str) -> Result<String> {
        let output = self
            .client
            .get_parameter()
            .name(parameter)
            .with_decryption(true)
            .send()
            .await
            .with_context(|| format!("SSM lookup of '{parameter}' failed"))?;

        output
            .parameter
            .and_then(|p| p.value)
            .ok_or_else(|| anyhow!("SSM parameter '{parameter}' has no value"))
    }
}
