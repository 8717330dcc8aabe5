use async_trait::async_trait;
use tracing::{debug, error};

use super::{build_http_client, decode_json, ensure_success};
use crate::config::Config;
use crate::errors::ClientError;
use crate::models::{ChatSession, MessageReply, MessageRequest, ProductList, SuggestionList};

/// The remote chat-history service as seen by the session synchronizer.
///
/// Every call returns a typed result; nothing panics or retries.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// `GET /chat/all`, oldest chat first.
    async fn list_chats(&self) -> Result<Vec<ChatSession>, ClientError>;

    /// `POST /chat/new`
    async fn create_chat(&self) -> Result<ChatSession, ClientError>;

    /// `GET /chat/{id}`
    async fn fetch_chat(&self, chat_id: &str) -> Result<ChatSession, ClientError>;

    /// `POST /chat/{id}/message`
    async fn send_message(&self, request: &MessageRequest) -> Result<MessageReply, ClientError>;

    /// `DELETE /chat/{id}`
    async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError>;

    /// `DELETE /chat/history`
    async fn clear_history(&self) -> Result<(), ClientError>;

    /// `GET /users/products`
    async fn list_products(&self) -> Result<Vec<String>, ClientError>;

    /// `GET /chat/{product_id}/suggestions`
    async fn suggestions(&self, product_id: &str) -> Result<Vec<String>, ClientError>;
}

/// `ChatService` over HTTP, authenticated with a bearer token.
#[derive(Clone)]
pub struct HttpChatService {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatService {
    pub fn new(config: &Config, token: impl Into<String>) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_http_client(config)?,
            base_url: config.api_base_url.clone(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn list_chats(&self) -> Result<Vec<ChatSession>, ClientError> {
        let resp = self.client.get(self.url("/chat/all")).bearer_auth(&self.token).send().await?;
        let chats: Vec<ChatSession> = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to fetch chats: {e}");
        })?;
        debug!("Fetched {} chats", chats.len());
        Ok(chats)
    }

    async fn create_chat(&self) -> Result<ChatSession, ClientError> {
        let resp = self
            .client
            .post(self.url("/chat/new"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let chat: ChatSession = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to create chat: {e}");
        })?;
        debug!("Created chat {}", chat.id);
        Ok(chat)
    }

    async fn fetch_chat(&self, chat_id: &str) -> Result<ChatSession, ClientError> {
        let resp = self
            .client
            .get(self.url(&format!("/chat/{chat_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        decode_json(resp).await.inspect_err(|e| {
            error!("Failed to fetch chat {chat_id}: {e}");
        })
    }

    async fn send_message(&self, request: &MessageRequest) -> Result<MessageReply, ClientError> {
        let resp = self
            .client
            .post(self.url(&format!("/chat/{}/message", request.chat_id)))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let reply: MessageReply = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to send message to chat {}: {e}", request.chat_id);
        })?;
        debug!("Chat {} now has {} messages", request.chat_id, reply.messages.len());
        Ok(reply)
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
        let resp = self
            .client
            .delete(self.url(&format!("/chat/{chat_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        ensure_success(resp).await.inspect_err(|e| {
            error!("Failed to delete chat {chat_id}: {e}");
        })?;
        Ok(())
    }

    async fn clear_history(&self) -> Result<(), ClientError> {
        let resp = self
            .client
            .delete(self.url("/chat/history"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        ensure_success(resp).await.inspect_err(|e| {
            error!("Failed to clear chat history: {e}");
        })?;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<String>, ClientError> {
        let resp = self
            .client
            .get(self.url("/users/products"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let list: ProductList = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to fetch products: {e}");
        })?;
        Ok(list.products)
    }

    async fn suggestions(&self, product_id: &str) -> Result<Vec<String>, ClientError> {
        let resp = self
            .client
            .get(self.url(&format!("/chat/{product_id}/suggestions")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let list: SuggestionList = decode_json(resp).await?;
        Ok(list.suggestions)
    }
}
