pub mod credential_store;
pub mod identity;

pub use credential_store::{CredentialStore, FileCredentialStore};
pub use identity::{Identity, Role};

use tracing::{info, warn};

use crate::errors::ClientError;

/// Signed-in state for the client. `login` and `logout` are the only ways it
/// changes after the initial `restore`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    identity: Option<Identity>,
    loading: bool,
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthContext {
    /// Starts in the loading state until `restore` has looked for a saved token.
    pub fn new() -> Self {
        Self { identity: None, loading: true }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Picks up a previously saved token. Unreadable, malformed or expired
    /// tokens are discarded and removed from the store.
    pub fn restore(&mut self, store: &dyn CredentialStore) {
        let restored = match store.load() {
            Ok(Some(token)) => match Identity::from_token(&token) {
                Ok(identity) => Some(identity),
                Err(e) => {
                    warn!("Discarding stored token: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Could not read stored credentials: {e}");
                None
            }
        };

        match &restored {
            Some(identity) => info!("Restored session for {}", identity.username),
            None => {
                if let Err(e) = store.clear() {
                    warn!("Could not clear stored credentials: {e}");
                }
            }
        }

        self.identity = restored;
        self.loading = false;
    }

    pub fn login(
        &mut self,
        token: &str,
        store: &dyn CredentialStore,
    ) -> Result<&Identity, ClientError> {
        let identity = Identity::from_token(token)?;
        store.save(token)?;
        info!("Signed in as {} ({})", identity.username, identity.role);
        Ok(self.identity.insert(identity))
    }

    /// Forgets the identity even if the stored token could not be removed.
    pub fn logout(&mut self, store: &dyn CredentialStore) -> Result<(), ClientError> {
        if let Some(identity) = self.identity.take() {
            info!("Signed out {}", identity.username);
        }
        store.clear()
    }

    pub fn require_role(&self, role: Role) -> Result<&Identity, ClientError> {
        let identity = self.identity.as_ref().ok_or(ClientError::NotSignedIn)?;
        if identity.role != role {
            return Err(ClientError::Forbidden { role: identity.role.to_string() });
        }
        Ok(identity)
    }
}
