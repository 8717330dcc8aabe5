use thiserror::Error;

/// Every failure the client can observe, grouped the way the session
/// synchronizer reacts to them: validation problems are caught before any
/// request goes out, network problems come back from the remote service, and
/// auth problems come from decoding or persisting the credential.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("No active chat session")]
    NoActiveSession,

    #[error("A reply is still pending for chat '{session_id}'")]
    ReplyPending { session_id: String },

    // ── Network errors ───────────────────────────────────────────────────────
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server returned {status}{}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },

    #[error("Could not decode response: {message}")]
    Decode { message: String },

    // ── Auth errors ──────────────────────────────────────────────────────────
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("Token has expired")]
    TokenExpired,

    #[error("Role '{role}' is not allowed here")]
    Forbidden { role: String },

    #[error("Credential storage failed: {message}")]
    Storage { message: String },

    // ── Local files ──────────────────────────────────────────────────────────
    #[error("Could not read '{path}': {message}")]
    LocalFile { path: String, message: String },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl ClientError {
    pub fn empty_field(field_name: impl Into<String>) -> Self {
        ClientError::EmptyField { field_name: field_name.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::EmptyField { .. }
                | ClientError::NoActiveSession
                | ClientError::ReplyPending { .. }
        )
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ClientError::Request(_) | ClientError::Status { .. } | ClientError::Decode { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ClientError::NotSignedIn
                | ClientError::InvalidToken { .. }
                | ClientError::TokenExpired
                | ClientError::Forbidden { .. }
        ) || matches!(self, ClientError::Status { status: 401 | 403, .. })
    }

    /// The server's own explanation, when it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ClientError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}
