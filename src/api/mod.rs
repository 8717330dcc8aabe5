pub mod admin_client;
pub mod auth_client;
pub mod chat_client;

pub use admin_client::{AdminService, HttpAdminService};
pub use auth_client::AuthApi;
pub use chat_client::{ChatService, HttpChatService};

use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::errors::ClientError;
use crate::models::ErrorBody;

fn build_http_client(config: &Config) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(ClientError::from)
}

/// Turns a non-success status into `ClientError::Status`, keeping the
/// server's `detail` text when the body carries one.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(ErrorBody::into_detail);
    Err(ClientError::Status { status: status.as_u16(), detail })
}

async fn decode_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    ensure_success(resp)
        .await?
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode { message: e.to_string() })
}
