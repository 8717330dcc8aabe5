use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::api::AdminService;
use crate::auth::Identity;
use crate::errors::ClientError;
use crate::models::{Analytics, ProductMetadata};
use crate::service::notifications::NotificationQueue;
use crate::service::session_sync::Confirm;

pub const CLEAR_FAILED_PROMPT: &str = "Are you sure you want to clear all failed queries?";

const PRODUCTS_FAILED: &str = "Failed to load products";
const ANALYTICS_FAILED: &str = "Failed to fetch analytics";
const NOTHING_TO_UPLOAD: &str = "Please select files to upload";
const UPLOADS_DONE: &str = "All files uploaded successfully!";
const DELETE_FAILED: &str = "Delete failed";
const CLEAR_FAILED: &str = "Failed to clear failed queries";
const CLEARED: &str = "Failed queries cleared successfully!";

#[derive(Default)]
struct DeskState {
    products: Vec<ProductMetadata>,
    analytics: Option<Analytics>,
}

/// The admin's view of the backend: ingested documents per product and usage
/// analytics. Failures are logged and queued as notifications, like the chat
/// side does.
#[derive(Clone)]
pub struct AdminDesk {
    service: Arc<dyn AdminService>,
    identity: Identity,
    notifications: NotificationQueue,
    state: Arc<Mutex<DeskState>>,
}

impl AdminDesk {
    pub fn new(
        service: Arc<dyn AdminService>,
        identity: Identity,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            service,
            identity,
            notifications,
            state: Arc::new(Mutex::new(DeskState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeskState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn products(&self) -> Vec<ProductMetadata> {
        self.state().products.clone()
    }

    pub fn analytics(&self) -> Option<Analytics> {
        self.state().analytics.clone()
    }

    /// Loads documents and analytics, reporting the first failure.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let products = self.load_products().await;
        let analytics = self.load_analytics().await;
        products.and(analytics)
    }

    pub async fn load_products(&self) -> Result<(), ClientError> {
        match self.service.products_metadata().await {
            Ok(products) => {
                self.state().products = products;
                Ok(())
            }
            Err(e) => {
                self.notifications.error(PRODUCTS_FAILED);
                Err(e)
            }
        }
    }

    pub async fn load_analytics(&self) -> Result<(), ClientError> {
        match self.service.analytics().await {
            Ok(analytics) => {
                self.state().analytics = Some(analytics);
                Ok(())
            }
            Err(e) => {
                self.notifications.error(ANALYTICS_FAILED);
                Err(e)
            }
        }
    }

    /// Uploads each file in turn and returns how many the server accepted.
    /// A file that cannot be read or is rejected does not stop the rest.
    pub async fn upload(&self, paths: &[PathBuf]) -> Result<usize, ClientError> {
        if paths.is_empty() {
            self.notifications.error(NOTHING_TO_UPLOAD);
            return Err(ClientError::empty_field("file"));
        }

        let mut accepted = 0;
        for path in paths {
            let name = display_name(path);
            match self.upload_one(path, &name).await {
                Ok(message) => {
                    debug!("{message}");
                    accepted += 1;
                }
                Err(e) => {
                    self.notifications.error(format!("Error uploading {name}: {e}"));
                }
            }
        }
        if accepted == paths.len() {
            self.notifications.info(UPLOADS_DONE);
        }
        info!("Uploaded {accepted} of {} files", paths.len());

        // The upload already went through; a failed reload is its own notification
        let _ = self.load_products().await;
        Ok(accepted)
    }

    async fn upload_one(&self, path: &Path, name: &str) -> Result<String, ClientError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ClientError::LocalFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let receipt = self.service.upload(name, bytes).await?;
        Ok(receipt.message)
    }

    /// Removes one document. The server drops the product too once its last
    /// document is gone.
    pub async fn delete_file(&self, file_id: &str) -> Result<(), ClientError> {
        let file_id = file_id.trim();
        if file_id.is_empty() {
            self.notifications.error(DELETE_FAILED);
            return Err(ClientError::empty_field("file_id"));
        }

        let name = self
            .state()
            .products
            .iter()
            .flat_map(|p| &p.files)
            .find(|f| f.file_id == file_id)
            .map(|f| f.file_name.clone())
            .unwrap_or_else(|| file_id.to_string());

        if let Err(e) = self.service.delete_file(file_id).await {
            self.notifications.error(DELETE_FAILED);
            return Err(e);
        }
        self.notifications.info(format!("File '{name}' deleted successfully"));

        let _ = self.load_products().await;
        Ok(())
    }

    /// Empties the failed-query log once the admin confirms.
    pub async fn clear_failed_queries(&self, confirm: &dyn Confirm) -> Result<(), ClientError> {
        if !confirm.confirm(CLEAR_FAILED_PROMPT) {
            debug!("Clearing failed queries not confirmed");
            return Ok(());
        }

        if let Err(e) = self.service.clear_failed_queries().await {
            self.notifications.error(CLEAR_FAILED);
            return Err(e);
        }
        if let Some(analytics) = self.state().analytics.as_mut() {
            analytics.failed_queries.clear();
        }
        self.notifications.info(CLEARED);
        Ok(())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
