use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// Where the bearer token survives between runs. The token is the only state
/// the client persists.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<String>, ClientError>;
    fn save(&self, token: &str) -> Result<(), ClientError>;
    fn clear(&self) -> Result<(), ClientError>;
}

#[derive(Serialize, Deserialize)]
struct StoredAuth {
    token: String,
}

/// Keeps `{"token": "..."}` in a JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn storage_err(action: &str, e: impl std::fmt::Display) -> ClientError {
    ClientError::Storage { message: format!("Failed to {action} credentials: {e}") }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>, ClientError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| storage_err("read", e))?;
        let stored: StoredAuth =
            serde_json::from_str(&content).map_err(|e| storage_err("parse", e))?;
        Ok(Some(stored.token))
    }

    fn save(&self, token: &str) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_err("prepare", e))?;
        }
        let content = serde_json::to_string(&StoredAuth { token: token.to_string() })
            .map_err(|e| storage_err("serialize", e))?;
        fs::write(&self.path, content).map_err(|e| storage_err("write", e))
    }

    fn clear(&self) -> Result<(), ClientError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| storage_err("remove", e))?;
        }
        Ok(())
    }
}
