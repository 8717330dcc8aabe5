use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, error, info};

use super::{build_http_client, decode_json};
use crate::config::Config;
use crate::errors::ClientError;
use crate::models::{Acknowledgement, Analytics, ProductMetadata, ProductsMetadata, UploadReceipt};

/// The backend's admin surface: document ingestion and usage analytics.
#[async_trait]
pub trait AdminService: Send + Sync {
    /// `GET /admin/products_metadata`, each product's files deduplicated.
    async fn products_metadata(&self) -> Result<Vec<ProductMetadata>, ClientError>;

    /// `GET /admin/analytics`
    async fn analytics(&self) -> Result<Analytics, ClientError>;

    /// `POST /admin/upload` as multipart field `file`. The server names the
    /// product after the file.
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, ClientError>;

    /// `DELETE /admin/delete/{file_id}`
    async fn delete_file(&self, file_id: &str) -> Result<String, ClientError>;

    /// `DELETE /admin/analytics/clear_failed_queries`
    async fn clear_failed_queries(&self) -> Result<String, ClientError>;
}

#[derive(Clone)]
pub struct HttpAdminService {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpAdminService {
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
impl AdminService for HttpAdminService {
    async fn products_metadata(&self) -> Result<Vec<ProductMetadata>, ClientError> {
        let resp = self
            .client
            .get(self.url("/admin/products_metadata"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let list: ProductsMetadata = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to fetch product metadata: {e}");
        })?;

        let mut products = list.products;
        for product in &mut products {
            product.dedup_files();
        }
        debug!("Fetched metadata for {} products", products.len());
        Ok(products)
    }

    async fn analytics(&self) -> Result<Analytics, ClientError> {
        let resp = self
            .client
            .get(self.url("/admin/analytics"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        decode_json(resp).await.inspect_err(|e| {
            error!("Failed to fetch analytics: {e}");
        })
    }

    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, ClientError> {
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;
        let resp = self
            .client
            .post(self.url("/admin/upload"))
            .bearer_auth(&self.token)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        let receipt: UploadReceipt = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to upload {file_name}: {e}");
        })?;
        info!("Uploaded {file_name} ({size} bytes)");
        Ok(receipt)
    }

    async fn delete_file(&self, file_id: &str) -> Result<String, ClientError> {
        let resp = self
            .client
            .delete(self.url(&format!("/admin/delete/{file_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let ack: Acknowledgement = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to delete file {file_id}: {e}");
        })?;
        Ok(ack.message)
    }

    async fn clear_failed_queries(&self) -> Result<String, ClientError> {
        let resp = self
            .client
            .delete(self.url("/admin/analytics/clear_failed_queries"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let ack: Acknowledgement = decode_json(resp).await.inspect_err(|e| {
            error!("Failed to clear failed queries: {e}");
        })?;
        Ok(ack.message)
    }
}
