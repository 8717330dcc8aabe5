use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::api::ChatService;
use crate::auth::Identity;
use crate::errors::ClientError;
use crate::models::{ChatSession, Message, MessageRequest};
use crate::service::notifications::NotificationQueue;

pub const DELETE_ONE_PROMPT: &str = "Are you sure you want to delete this chat?";
pub const DELETE_ALL_PROMPT: &str = "Are you sure you want to delete all chats?";

const FETCH_CHATS_FAILED: &str = "Failed to fetch chats. Starting a new chat.";
const CREATE_FAILED: &str = "Failed to start a new chat. Try again later.";
const SELECT_FAILED: &str = "Failed to load selected chat. Showing cached messages.";
const DELETE_FAILED: &str = "Failed to delete chat. Try again.";
const DELETE_ALL_FAILED: &str = "Failed to delete all chats. Try again.";
const SEND_FAILED: &str = "Failed to send message. Try again later.";
const PRODUCTS_FAILED: &str = "Failed to load products. Please refresh.";

/// Asks the user to confirm a destructive action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Default)]
struct SyncState {
    sessions: Vec<ChatSession>,
    /// The chat on screen; its `messages` is the visible log.
    active: Option<ChatSession>,
    /// How many trailing messages of the active log are still unconfirmed.
    optimistic_tail: usize,
    /// The active log starts with the local welcome line.
    greeted: bool,
    /// Bumped whenever the active chat changes or a switch is requested.
    view_epoch: u64,
    /// Chats with a reply outstanding.
    composing: HashSet<String>,
    products: Vec<String>,
    selected_product: Option<String>,
    suggestions: Vec<String>,
}

impl SyncState {
    fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.id.as_str())
    }

    fn activate(&mut self, session: ChatSession) {
        self.active = Some(session);
        self.optimistic_tail = 0;
        self.greeted = false;
        self.view_epoch += 1;
    }

    fn deactivate(&mut self) {
        self.active = None;
        self.optimistic_tail = 0;
        self.greeted = false;
        self.view_epoch += 1;
    }

    /// The active chat as the server knows it plus any unconfirmed questions,
    /// without the welcome line.
    fn active_record(&self) -> Option<ChatSession> {
        let mut record = self.active.clone()?;
        if self.greeted && !record.messages.is_empty() {
            record.messages.remove(0);
        }
        Some(record)
    }

    /// Replace-by-id, appending if the id is new.
    fn upsert(&mut self, session: &ChatSession) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(slot) => *slot = session.clone(),
            None => self.sessions.push(session.clone()),
        }
    }

    fn replace_cached(&mut self, session: &ChatSession) {
        if let Some(slot) = self.sessions.iter_mut().find(|s| s.id == session.id) {
            *slot = session.clone();
        }
    }
}

fn lock(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the "bot is typing" marker for one chat and clears it on drop,
/// whichever way the send finishes.
struct ComposingGuard {
    state: Arc<Mutex<SyncState>>,
    session_id: String,
}

impl Drop for ComposingGuard {
    fn drop(&mut self) {
        lock(&self.state).composing.remove(&self.session_id);
    }
}

/// Point-in-time copy of the chat list and the active chat.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub sessions: Vec<ChatSession>,
    pub active: Option<ChatSession>,
}

impl SyncSnapshot {
    pub fn messages(&self) -> &[Message] {
        self.active.as_ref().map(|s| s.messages.as_slice()).unwrap_or_default()
    }
}

/// Keeps the local chat list and the active chat's message log in step with
/// the remote chat service.
///
/// The local list is only ever a cache. Sends are applied optimistically and
/// then replaced wholesale by the server's log. Deletes wait for the server
/// before touching local state. Failures are logged, turned into a
/// notification and returned; nothing here panics or retries.
///
/// Cloning is cheap and every clone sees the same state. The lock is never
/// held across a request, so several operations may be in flight at once.
#[derive(Clone)]
pub struct SessionSync {
    service: Arc<dyn ChatService>,
    identity: Identity,
    notifications: NotificationQueue,
    state: Arc<Mutex<SyncState>>,
}

impl SessionSync {
    pub fn new(
        service: Arc<dyn ChatService>,
        identity: Identity,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            service,
            identity,
            notifications,
            state: Arc::new(Mutex::new(SyncState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        lock(&self.state)
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.state().sessions.clone()
    }

    pub fn active_session(&self) -> Option<ChatSession> {
        self.state().active.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().active.as_ref().map(|s| s.messages.clone()).unwrap_or_default()
    }

    pub fn optimistic_len(&self) -> usize {
        self.state().optimistic_tail
    }

    /// Whether a reply is outstanding for the chat on screen.
    pub fn is_composing(&self) -> bool {
        let state = self.state();
        state.active_id().is_some_and(|id| state.composing.contains(id))
    }

    pub fn products(&self) -> Vec<String> {
        self.state().products.clone()
    }

    pub fn selected_product(&self) -> Option<String> {
        self.state().selected_product.clone()
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.state().suggestions.clone()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.state();
        SyncSnapshot { sessions: state.sessions.clone(), active: state.active.clone() }
    }

    // ── Chat lifecycle ───────────────────────────────────────────────────────

    /// Loads the user's chats and opens the newest one, or starts a fresh chat
    /// when there are none or the list cannot be fetched.
    pub async fn initialize(&self) -> Result<(), ClientError> {
        info!("Loading chats for {}", self.identity.username);
        match self.service.list_chats().await {
            Ok(chats) if !chats.is_empty() => {
                let mut state = self.state();
                let latest = chats[chats.len() - 1].clone();
                debug!("Opening latest of {} chats: {}", chats.len(), latest.id);
                state.sessions = chats;
                state.activate(latest);
                Ok(())
            }
            Ok(_) => {
                debug!("No chats yet, starting one");
                self.create_session(false).await
            }
            Err(e) => {
                warn!("Falling back to a new chat: {e}");
                self.notifications.error(FETCH_CHATS_FAILED);
                self.create_session(false).await
            }
        }
    }

    /// Starts a new chat and makes it active, greeting the user.
    ///
    /// With `persist_current`, an active chat holding real messages is first
    /// written back into the local list so its latest local log is not lost.
    /// The welcome line is never written back.
    pub async fn create_session(&self, persist_current: bool) -> Result<(), ClientError> {
        if persist_current {
            let mut state = self.state();
            if let Some(current) = state.active_record().filter(|s| !s.messages.is_empty()) {
                state.replace_cached(&current);
            }
        }

        match self.service.create_chat().await {
            Ok(chat) => {
                let mut seeded = chat.clone();
                seeded.messages = vec![Message::welcome(&self.identity.username)];

                let mut state = self.state();
                state.upsert(&chat);
                state.activate(seeded);
                state.greeted = true;
                state.selected_product = None;
                state.suggestions.clear();
                info!("Started chat {}", chat.id);
                Ok(())
            }
            Err(e) => {
                self.notifications.error(CREATE_FAILED);
                Err(e)
            }
        }
    }

    /// Opens `target`, preferring the server's copy and falling back to the
    /// cached one if it cannot be fetched. A response that arrives after a
    /// newer switch was requested is dropped.
    pub async fn select_session(&self, target: &ChatSession) -> Result<(), ClientError> {
        let epoch = {
            let mut state = self.state();
            state.view_epoch += 1;
            state.view_epoch
        };

        let result = self.service.fetch_chat(&target.id).await;

        let mut state = self.state();
        if state.view_epoch != epoch {
            debug!("Dropping stale load of chat {}", target.id);
            return Ok(());
        }
        match result {
            Ok(chat) => {
                debug!("Opened chat {} with {} messages", chat.id, chat.messages.len());
                state.replace_cached(&chat);
                state.activate(chat);
                Ok(())
            }
            Err(e) => {
                state.activate(target.clone());
                drop(state);
                self.notifications.error(SELECT_FAILED);
                Err(e)
            }
        }
    }

    /// Deletes one chat once the user confirms and the server agrees. If it
    /// was on screen, the newest remaining chat opens, or a new one is started.
    pub async fn delete_session(
        &self,
        chat_id: &str,
        confirm: &dyn Confirm,
    ) -> Result<(), ClientError> {
        if !confirm.confirm(DELETE_ONE_PROMPT) {
            debug!("Delete of chat {chat_id} not confirmed");
            return Ok(());
        }

        if let Err(e) = self.service.delete_chat(chat_id).await {
            self.notifications.error(DELETE_FAILED);
            return Err(e);
        }

        let needs_new_chat = {
            let mut state = self.state();
            state.sessions.retain(|s| s.id != chat_id);
            if state.active_id() == Some(chat_id) {
                match state.sessions.last().cloned() {
                    Some(latest) => {
                        state.activate(latest);
                        false
                    }
                    None => {
                        state.deactivate();
                        true
                    }
                }
            } else {
                false
            }
        };
        info!("Deleted chat {chat_id}");

        if needs_new_chat {
            self.create_session(false).await?;
        }
        Ok(())
    }

    /// Deletes every chat once the user confirms and the server agrees, then
    /// starts a new one. Nothing local changes if the server call fails.
    pub async fn delete_all_sessions(&self, confirm: &dyn Confirm) -> Result<(), ClientError> {
        if !confirm.confirm(DELETE_ALL_PROMPT) {
            debug!("Delete of all chats not confirmed");
            return Ok(());
        }

        if let Err(e) = self.service.clear_history().await {
            self.notifications.error(DELETE_ALL_FAILED);
            return Err(e);
        }

        {
            let mut state = self.state();
            state.sessions.clear();
            state.deactivate();
        }
        info!("Cleared chat history for {}", self.identity.username);

        self.create_session(false).await
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    /// Asks `text` about `product_id` in the active chat.
    ///
    /// The question shows up in the log before the request goes out. On
    /// success the log becomes exactly what the server returned. On failure
    /// the question stays and no reply is added. Only one question per chat
    /// may be outstanding; a second one is refused.
    pub async fn send_message(&self, text: &str, product_id: &str) -> Result<(), ClientError> {
        if text.trim().is_empty() {
            return Err(self.reject(ClientError::empty_field("question")));
        }
        if product_id.trim().is_empty() {
            return Err(self.reject(ClientError::empty_field("product_id")));
        }

        let admitted = {
            let mut state = self.state();
            match state.active_id().map(str::to_owned) {
                None => Err(ClientError::NoActiveSession),
                Some(id) if state.composing.contains(&id) => {
                    Err(ClientError::ReplyPending { session_id: id })
                }
                Some(id) => {
                    if let Some(active) = state.active.as_mut() {
                        active.messages.push(Message::user(text, product_id));
                    }
                    state.optimistic_tail += 1;
                    state.composing.insert(id.clone());
                    Ok(id)
                }
            }
        };
        let session_id = admitted.map_err(|e| self.reject(e))?;
        let _composing = ComposingGuard {
            state: Arc::clone(&self.state),
            session_id: session_id.clone(),
        };

        let request = MessageRequest {
            chat_id: session_id.clone(),
            product_id: product_id.to_string(),
            question: text.to_string(),
        };
        debug!("Sending question to chat {session_id} about {product_id}");

        match self.service.send_message(&request).await {
            Ok(reply) => {
                let mut state = self.state();
                let still_active = state.active_id() == Some(session_id.as_str());
                match reply.session() {
                    Some(record) => {
                        state.replace_cached(&record);
                        if still_active {
                            state.active = Some(record);
                        }
                    }
                    None if still_active => {
                        if let Some(active) = state.active.as_mut() {
                            active.messages = reply.messages;
                        }
                    }
                    None => {}
                }
                if still_active {
                    state.optimistic_tail = 0;
                    state.greeted = false;
                } else {
                    debug!("Chat {session_id} is no longer on screen; keeping reply in cache only");
                }
                Ok(())
            }
            Err(e) => {
                self.notifications.error(SEND_FAILED);
                Err(e)
            }
        }
    }

    /// Sends a suggested question about the selected product.
    pub async fn send_suggestion(&self, text: &str) -> Result<(), ClientError> {
        let product_id = {
            let mut state = self.state();
            state.suggestions.clear();
            state.selected_product.clone().unwrap_or_default()
        };
        self.send_message(text, &product_id).await
    }

    // ── Products ─────────────────────────────────────────────────────────────

    pub async fn load_products(&self) -> Result<(), ClientError> {
        match self.service.list_products().await {
            Ok(products) => {
                debug!("Loaded {} products", products.len());
                self.state().products = products;
                Ok(())
            }
            Err(e) => {
                self.notifications.error(PRODUCTS_FAILED);
                Err(e)
            }
        }
    }

    /// Selects the product questions are asked about and loads its suggested
    /// questions. Missing suggestions are not worth a notification.
    pub async fn select_product(&self, product_id: &str) {
        let product_id = product_id.trim();
        {
            let mut state = self.state();
            state.suggestions.clear();
            state.selected_product = Some(product_id.to_string()).filter(|p| !p.is_empty());
        }
        if product_id.is_empty() {
            return;
        }

        let result = self.service.suggestions(product_id).await;

        let mut state = self.state();
        if state.selected_product.as_deref() != Some(product_id) {
            debug!("Dropping suggestions for {product_id}; selection changed");
            return;
        }
        match result {
            Ok(suggestions) => state.suggestions = suggestions,
            Err(e) => debug!("No suggestions for {product_id}: {e}"),
        }
    }

    /// Surfaces a validation failure and hands it back.
    fn reject(&self, err: ClientError) -> ClientError {
        let text = match &err {
            ClientError::EmptyField { field_name } if field_name == "product_id" => {
                "Please select a product before sending."
            }
            ClientError::EmptyField { .. } => "Please enter a question before sending.",
            ClientError::ReplyPending { .. } => {
                "Please wait for the current reply before asking again."
            }
            _ => "No active chat found. Please start a new chat.",
        };
        self.notifications.error(text);
        err
    }
}
