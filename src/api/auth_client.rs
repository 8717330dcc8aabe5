use tracing::{error, info};

use super::{build_http_client, decode_json};
use crate::config::Config;
use crate::errors::ClientError;
use crate::models::{Credentials, TokenResponse};

/// Calls the backend's `/auth` endpoints. These are the only unauthenticated
/// requests the client makes.
#[derive(Clone)]
pub struct AuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl AuthApi {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.api_base_url.clone(),
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ClientError> {
        let token = self.exchange("/auth/login", username, password).await?;
        info!("Logged in as {}", token.username);
        Ok(token)
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<TokenResponse, ClientError> {
        let token = self.exchange("/auth/register", username, password).await?;
        info!("Registered {}", token.username);
        Ok(token)
    }

    async fn exchange(
        &self,
        path: &str,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ClientError> {
        let credentials = Credentials {
            username: username.trim().to_string(),
            password: password.trim().to_string(),
        };
        if credentials.username.is_empty() {
            return Err(ClientError::empty_field("username"));
        }
        if credentials.password.is_empty() {
            return Err(ClientError::empty_field("password"));
        }

        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&credentials)
            .send()
            .await?;
        decode_json(resp).await.inspect_err(|e| {
            error!("{path} failed for {}: {e}", credentials.username);
        })
    }
}
