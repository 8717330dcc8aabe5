#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::api::ChatService;
    use crate::auth::identity::test_token;
    use crate::auth::Identity;
    use crate::errors::ClientError;
    use crate::models::{ChatSession, Message, MessageReply, MessageRequest, Sender};
    use crate::service::notifications::NotificationQueue;
    use crate::service::session_sync::SessionSync;

    // Mock remote chat service backed by an in-memory chat list
    #[derive(Default)]
    struct MockChatService {
        chats: Mutex<Vec<ChatSession>>,
        failing: Mutex<HashSet<&'static str>>,
        calls: Mutex<HashMap<&'static str, usize>>,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
        next_id: AtomicUsize,
        reply_without_record: AtomicBool,
    }

    impl MockChatService {
        fn with_chats(chats: Vec<ChatSession>) -> Self {
            Self { chats: Mutex::new(chats), ..Default::default() }
        }

        fn fail(&self, op: &'static str) {
            self.failing.lock().unwrap().insert(op);
        }

        fn calls(&self, op: &'static str) -> usize {
            self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }

        /// Holds requests keyed by `key` until the returned handle is notified.
        fn gate(&self, key: &str) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            self.gates.lock().unwrap().insert(key.to_string(), notify.clone());
            notify
        }

        fn server_chat(&self, id: &str) -> Option<ChatSession> {
            self.chats.lock().unwrap().iter().find(|c| c.id == id).cloned()
        }

        fn record(&self, op: &'static str) -> Result<(), ClientError> {
            *self.calls.lock().unwrap().entry(op).or_default() += 1;
            if self.failing.lock().unwrap().contains(op) {
                return Err(ClientError::Status { status: 500, detail: None });
            }
            Ok(())
        }

        async fn wait_gate(&self, key: &str) {
            let gate = self.gates.lock().unwrap().get(key).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }
    }

    #[async_trait]
    impl ChatService for MockChatService {
        async fn list_chats(&self) -> Result<Vec<ChatSession>, ClientError> {
            self.record("list")?;
            Ok(self.chats.lock().unwrap().clone())
        }

        async fn create_chat(&self) -> Result<ChatSession, ClientError> {
            self.record("create")?;
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let chat = ChatSession {
                id: format!("new-{n}"),
                title: Some("New Chat".into()),
                messages: Vec::new(),
                created_at: None,
                updated_at: None,
            };
            self.chats.lock().unwrap().push(chat.clone());
            Ok(chat)
        }

        async fn fetch_chat(&self, chat_id: &str) -> Result<ChatSession, ClientError> {
            self.record("fetch")?;
            self.wait_gate(chat_id).await;
            self.server_chat(chat_id)
                .ok_or(ClientError::Status { status: 404, detail: Some("Chat not found".into()) })
        }

        async fn send_message(&self, request: &MessageRequest) -> Result<MessageReply, ClientError> {
            self.record("send")?;
            self.wait_gate("send").await;
            let mut chats = self.chats.lock().unwrap();
            let chat = chats
                .iter_mut()
                .find(|c| c.id == request.chat_id)
                .ok_or(ClientError::Status { status: 404, detail: None })?;
            chat.messages.push(Message::user(&request.question, &request.product_id));
            chat.messages.push(bot(&format!("Answer to: {}", request.question)));

            let mut reply = MessageReply {
                id: Some(chat.id.clone()),
                title: chat.title.clone(),
                messages: chat.messages.clone(),
                created_at: None,
                updated_at: None,
            };
            if self.reply_without_record.load(Ordering::SeqCst) {
                reply.id = None;
            }
            Ok(reply)
        }

        async fn delete_chat(&self, chat_id: &str) -> Result<(), ClientError> {
            self.record("delete")?;
            self.chats.lock().unwrap().retain(|c| c.id != chat_id);
            Ok(())
        }

        async fn clear_history(&self) -> Result<(), ClientError> {
            self.record("clear")?;
            self.chats.lock().unwrap().clear();
            Ok(())
        }

        async fn list_products(&self) -> Result<Vec<String>, ClientError> {
            self.record("products")?;
            Ok(vec!["router-x".into(), "modem-y".into()])
        }

        async fn suggestions(&self, product_id: &str) -> Result<Vec<String>, ClientError> {
            self.record("suggestions")?;
            Ok(vec![format!("How do I set up {product_id}?")])
        }
    }

    fn bot(text: &str) -> Message {
        Message {
            sender: Sender::Bot,
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
            product_id: None,
            sources: vec!["manual.pdf".into()],
        }
    }

    fn chat(id: &str, texts: &[&str]) -> ChatSession {
        ChatSession {
            id: id.to_string(),
            title: Some(format!("Chat {id}")),
            messages: texts.iter().map(|t| Message::user(*t, "router-x")).collect(),
            created_at: None,
            updated_at: None,
        }
    }

    fn setup(chats: Vec<ChatSession>) -> (SessionSync, Arc<MockChatService>) {
        let mock = Arc::new(MockChatService::with_chats(chats));
        let service: Arc<dyn ChatService> = mock.clone();
        let identity = Identity::from_token(&test_token("asha", "user", None)).unwrap();
        let sync = SessionSync::new(service, identity, NotificationQueue::new(Duration::from_secs(3)));
        (sync, mock)
    }

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    // ── initialize ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn initialize_opens_latest_chat() {
        let (sync, mock) = setup(vec![chat("a", &["one"]), chat("b", &["two", "three"])]);

        sync.initialize().await.unwrap();

        assert_eq!(sync.sessions().len(), 2);
        assert_eq!(sync.active_session().map(|s| s.id), Some("b".to_string()));
        assert_eq!(sync.messages().len(), 2);
        assert_eq!(mock.calls("create"), 0);
        assert!(sync.notifications().is_empty());
    }

    #[tokio::test]
    async fn empty_history_bootstraps_one_seeded_chat() {
        let (sync, mock) = setup(vec![]);

        sync.initialize().await.unwrap();

        assert_eq!(mock.calls("create"), 1);
        let sessions = sync.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sync.active_session().map(|s| s.id), Some(sessions[0].id.clone()));

        let messages = sync.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::Bot);
        assert!(messages[0].text.contains("asha"));
    }

    #[tokio::test]
    async fn fetch_failure_starts_new_chat_with_notice() {
        let (sync, mock) = setup(vec![chat("a", &["one"])]);
        mock.fail("list");

        sync.initialize().await.unwrap();

        assert_eq!(mock.calls("create"), 1);
        assert_eq!(sync.sessions().len(), 1);
        assert_eq!(sync.messages().len(), 1);
        assert_eq!(
            sync.notifications().texts(),
            vec!["Failed to fetch chats. Starting a new chat.".to_string()]
        );
    }

    #[tokio::test]
    async fn fetch_and_create_failure_leaves_empty_state() {
        let (sync, mock) = setup(vec![]);
        mock.fail("list");
        mock.fail("create");

        assert!(sync.initialize().await.is_err());

        assert!(sync.sessions().is_empty());
        assert!(sync.active_session().is_none());
        assert_eq!(sync.notifications().len(), 2);
    }

    // ── create_session ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn new_chat_keeps_local_log_of_previous_one() {
        let (sync, mock) = setup(vec![chat("a", &["one"])]);
        sync.initialize().await.unwrap();
        mock.fail("send");
        let _ = sync.send_message("unanswered", "router-x").await;

        sync.create_session(true).await.unwrap();

        let cached = sync.sessions().into_iter().find(|s| s.id == "a").unwrap();
        assert_eq!(cached.messages.len(), 2);
        assert_eq!(cached.messages[1].text, "unanswered");
        assert_eq!(sync.active_session().map(|s| s.id), Some("new-0".to_string()));
    }

    #[tokio::test]
    async fn new_chat_resets_product_and_suggestions() {
        let (sync, _mock) = setup(vec![chat("a", &[])]);
        sync.initialize().await.unwrap();
        sync.select_product("router-x").await;
        assert_eq!(sync.suggestions().len(), 1);

        sync.create_session(true).await.unwrap();

        assert!(sync.selected_product().is_none());
        assert!(sync.suggestions().is_empty());
    }

    #[tokio::test]
    async fn welcome_line_is_never_cached() {
        let (sync, mock) = setup(vec![]);
        sync.initialize().await.unwrap();

        sync.create_session(true).await.unwrap();

        let first = sync.sessions().into_iter().find(|s| s.id == "new-0").unwrap();
        assert!(first.messages.is_empty());

        mock.fail("fetch");
        assert!(sync.select_session(&first).await.is_err());
        assert!(sync.messages().is_empty());
    }

    #[tokio::test]
    async fn unanswered_question_in_new_chat_is_cached_without_welcome() {
        let (sync, mock) = setup(vec![]);
        sync.initialize().await.unwrap();
        mock.fail("send");
        let _ = sync.send_message("unanswered", "router-x").await;
        assert_eq!(sync.messages().len(), 2);

        sync.create_session(true).await.unwrap();

        let first = sync.sessions().into_iter().find(|s| s.id == "new-0").unwrap();
        assert_eq!(first.messages.len(), 1);
        assert_eq!(first.messages[0].text, "unanswered");
    }

    #[tokio::test]
    async fn failed_create_changes_nothing() {
        let (sync, mock) = setup(vec![chat("a", &["one"])]);
        sync.initialize().await.unwrap();
        let before = sync.snapshot();
        mock.fail("create");

        assert!(sync.create_session(true).await.is_err());

        assert_eq!(sync.snapshot(), before);
        assert_eq!(
            sync.notifications().texts(),
            vec!["Failed to start a new chat. Try again later.".to_string()]
        );
    }

    // ── select_session ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn select_uses_server_copy() {
        let (sync, mock) = setup(vec![chat("a", &["one"]), chat("b", &[])]);
        sync.initialize().await.unwrap();
        let cached_a = sync.sessions()[0].clone();
        mock.chats.lock().unwrap()[0].messages.push(bot("arrived elsewhere"));

        sync.select_session(&cached_a).await.unwrap();

        assert_eq!(sync.active_session().map(|s| s.id), Some("a".to_string()));
        assert_eq!(sync.messages().len(), 2);
        assert_eq!(mock.calls("fetch"), 1);
    }

    #[tokio::test]
    async fn select_failure_shows_cached_copy() {
        let (sync, mock) = setup(vec![chat("a", &["one", "two"]), chat("b", &[])]);
        sync.initialize().await.unwrap();
        let cached_a = sync.sessions()[0].clone();
        mock.fail("fetch");

        assert!(sync.select_session(&cached_a).await.is_err());

        assert_eq!(sync.active_session(), Some(cached_a.clone()));
        assert_eq!(sync.messages(), cached_a.messages);
        assert_eq!(sync.notifications().len(), 1);
    }

    #[tokio::test]
    async fn stale_select_is_dropped() {
        let (sync, mock) = setup(vec![chat("a", &["one"]), chat("b", &["two"]), chat("c", &[])]);
        sync.initialize().await.unwrap();
        let sessions = sync.sessions();
        let gate_a = mock.gate("a");

        let (first, second) = tokio::join!(sync.select_session(&sessions[0]), async {
            let result = sync.select_session(&sessions[1]).await;
            gate_a.notify_one();
            result
        });

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(sync.active_session().map(|s| s.id), Some("b".to_string()));
        assert_eq!(sync.messages()[0].text, "two");
    }

    // ── delete_session / delete_all_sessions ─────────────────────────────────

    #[tokio::test]
    async fn declined_deletes_make_no_calls() {
        let (sync, mock) = setup(vec![chat("a", &["one"])]);
        sync.initialize().await.unwrap();
        let before = sync.snapshot();
        let calls_before = mock.total_calls();

        sync.delete_session("a", &no).await.unwrap();
        sync.delete_all_sessions(&no).await.unwrap();

        assert_eq!(mock.calls("delete"), 0);
        assert_eq!(mock.calls("clear"), 0);
        assert_eq!(mock.total_calls(), calls_before);
        assert_eq!(sync.snapshot(), before);
    }

    #[tokio::test]
    async fn deleting_active_opens_latest_remaining() {
        let (sync, _mock) = setup(vec![chat("a", &["one"]), chat("b", &["two"]), chat("c", &["three"])]);
        sync.initialize().await.unwrap();

        sync.delete_session("c", &yes).await.unwrap();

        let ids: Vec<String> = sync.sessions().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(sync.active_session().map(|s| s.id), Some("b".to_string()));
        assert_eq!(sync.messages()[0].text, "two");
    }

    #[tokio::test]
    async fn deleting_inactive_keeps_active() {
        let (sync, _mock) = setup(vec![chat("a", &["one"]), chat("b", &["two"])]);
        sync.initialize().await.unwrap();

        sync.delete_session("a", &yes).await.unwrap();

        assert_eq!(sync.sessions().len(), 1);
        assert_eq!(sync.active_session().map(|s| s.id), Some("b".to_string()));
    }

    #[tokio::test]
    async fn deleting_last_chat_starts_new_one() {
        let (sync, mock) = setup(vec![chat("a", &["one"])]);
        sync.initialize().await.unwrap();

        sync.delete_session("a", &yes).await.unwrap();

        assert_eq!(mock.calls("create"), 1);
        assert_eq!(sync.sessions().len(), 1);
        assert_eq!(sync.active_session().map(|s| s.id), Some("new-0".to_string()));
        assert_eq!(sync.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_delete_changes_nothing() {
        let (sync, mock) = setup(vec![chat("a", &["one"]), chat("b", &["two"])]);
        sync.initialize().await.unwrap();
        let before = sync.snapshot();
        mock.fail("delete");

        assert!(sync.delete_session("b", &yes).await.is_err());

        assert_eq!(sync.snapshot(), before);
        assert_eq!(
            sync.notifications().texts(),
            vec!["Failed to delete chat. Try again.".to_string()]
        );
    }

    #[tokio::test]
    async fn delete_all_starts_over() {
        let (sync, mock) = setup(vec![chat("a", &["one"]), chat("b", &["two"])]);
        sync.initialize().await.unwrap();

        sync.delete_all_sessions(&yes).await.unwrap();

        assert_eq!(mock.calls("clear"), 1);
        assert_eq!(sync.sessions().len(), 1);
        assert_eq!(sync.active_session().map(|s| s.id), Some("new-0".to_string()));
        assert_eq!(sync.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_delete_all_is_atomic() {
        let (sync, mock) = setup(vec![chat("a", &["one"]), chat("b", &["two", "three"])]);
        sync.initialize().await.unwrap();
        let before = sync.snapshot();
        mock.fail("clear");

        assert!(sync.delete_all_sessions(&yes).await.is_err());

        assert_eq!(sync.snapshot(), before);
        assert_eq!(sync.messages(), before.messages());
        assert_eq!(mock.calls("create"), 0);
        assert_eq!(sync.notifications().len(), 1);
    }

    // ── send_message ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn replies_replace_log_without_duplicates() {
        let (sync, mock) = setup(vec![chat("a", &[])]);
        sync.initialize().await.unwrap();

        sync.send_message("first", "router-x").await.unwrap();
        sync.send_message("second", "router-x").await.unwrap();

        let server = mock.server_chat("a").unwrap();
        assert_eq!(sync.messages(), server.messages);
        assert_eq!(sync.messages().len(), 4);
        assert_eq!(sync.optimistic_len(), 0);
        assert_eq!(sync.sessions()[0], server);
        assert!(sync.notifications().is_empty());
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_server() {
        let (sync, mock) = setup(vec![chat("a", &[])]);
        sync.initialize().await.unwrap();
        let calls_before = mock.total_calls();

        let empty = sync.send_message("", "p1").await.unwrap_err();
        assert!(empty.is_validation());
        assert_eq!(sync.notifications().drain().len(), 1);

        let blank = sync.send_message("   ", "p1").await.unwrap_err();
        assert!(blank.is_validation());
        assert_eq!(sync.notifications().drain().len(), 1);

        let no_product = sync.send_message("hello", "").await.unwrap_err();
        assert!(no_product.is_validation());
        assert_eq!(
            sync.notifications().texts(),
            vec!["Please select a product before sending.".to_string()]
        );

        assert_eq!(mock.total_calls(), calls_before);
        assert!(sync.messages().is_empty());
    }

    #[tokio::test]
    async fn send_without_active_chat_is_refused() {
        let (sync, mock) = setup(vec![]);

        let err = sync.send_message("hello", "p1").await.unwrap_err();

        assert!(matches!(err, ClientError::NoActiveSession));
        assert_eq!(mock.total_calls(), 0);
        assert_eq!(sync.notifications().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_keeps_question() {
        let (sync, mock) = setup(vec![chat("a", &["one", "two"])]);
        sync.initialize().await.unwrap();
        let before = sync.messages();
        mock.fail("send");

        assert!(sync.send_message("hi", "p1").await.is_err());

        let after = sync.messages();
        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after[before.len()].text, "hi");
        assert_eq!(after[before.len()].sender, Sender::User);
        assert_eq!(after[before.len()].product_id.as_deref(), Some("p1"));
        assert_eq!(sync.optimistic_len(), 1);
        assert!(!sync.is_composing());
        assert_eq!(
            sync.notifications().texts(),
            vec!["Failed to send message. Try again later.".to_string()]
        );
    }

    #[tokio::test]
    async fn question_shows_before_reply_and_blocks_second_send() {
        let (sync, mock) = setup(vec![chat("a", &[])]);
        sync.initialize().await.unwrap();
        let gate = mock.gate("send");

        let (first, second) = tokio::join!(sync.send_message("hi", "router-x"), async {
            let visible = sync.messages();
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].text, "hi");
            assert!(sync.is_composing());
            assert_eq!(sync.optimistic_len(), 1);

            let second = sync.send_message("again", "router-x").await;
            gate.notify_one();
            second
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(ClientError::ReplyPending { .. })));
        assert_eq!(mock.calls("send"), 1);
        assert!(!sync.is_composing());
        assert_eq!(sync.messages().len(), 2);
        assert_eq!(sync.messages()[1].text, "Answer to: hi");
    }

    #[tokio::test]
    async fn abandoned_send_releases_the_chat() {
        let (sync, mock) = setup(vec![chat("a", &[])]);
        sync.initialize().await.unwrap();
        let _gate = mock.gate("send");

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), sync.send_message("hi", "router-x")).await;

        assert!(abandoned.is_err());
        assert!(!sync.is_composing());
        assert_eq!(sync.optimistic_len(), 1);
        assert_eq!(sync.messages()[0].text, "hi");

        mock.gates.lock().unwrap().clear();
        sync.send_message("again", "router-x").await.unwrap();

        assert_eq!(mock.calls("send"), 2);
        assert!(!sync.is_composing());
        assert_eq!(sync.messages(), mock.server_chat("a").unwrap().messages);
    }

    #[tokio::test]
    async fn reply_for_chat_left_behind_only_updates_cache() {
        let (sync, mock) = setup(vec![chat("a", &[])]);
        sync.initialize().await.unwrap();
        let gate = mock.gate("send");

        let (sent, created) = tokio::join!(sync.send_message("hi", "router-x"), async {
            let created = sync.create_session(true).await;
            gate.notify_one();
            created
        });

        assert!(sent.is_ok() && created.is_ok());
        assert_eq!(sync.active_session().map(|s| s.id), Some("new-0".to_string()));
        assert_eq!(sync.messages().len(), 1);
        let cached_a = sync.sessions().into_iter().find(|s| s.id == "a").unwrap();
        assert_eq!(cached_a.messages.len(), 2);
    }

    #[tokio::test]
    async fn reply_without_record_still_replaces_log() {
        let (sync, mock) = setup(vec![chat("a", &["one"])]);
        sync.initialize().await.unwrap();
        mock.reply_without_record.store(true, Ordering::SeqCst);

        sync.send_message("hi", "router-x").await.unwrap();

        assert_eq!(sync.messages(), mock.server_chat("a").unwrap().messages);
        assert_eq!(sync.sessions()[0].messages.len(), 1);
    }

    // ── products and suggestions ─────────────────────────────────────────────

    #[tokio::test]
    async fn products_load_and_failures_notify() {
        let (sync, mock) = setup(vec![]);
        sync.load_products().await.unwrap();
        assert_eq!(sync.products(), vec!["router-x", "modem-y"]);

        let (other, other_mock) = setup(vec![]);
        other_mock.fail("products");
        assert!(other.load_products().await.is_err());
        assert!(other.products().is_empty());
        assert_eq!(
            other.notifications().texts(),
            vec!["Failed to load products. Please refresh.".to_string()]
        );
        assert_eq!(mock.calls("products"), 1);
    }

    #[tokio::test]
    async fn missing_suggestions_are_quiet() {
        let (sync, mock) = setup(vec![]);
        mock.fail("suggestions");

        sync.select_product("router-x").await;

        assert_eq!(sync.selected_product().as_deref(), Some("router-x"));
        assert!(sync.suggestions().is_empty());
        assert!(sync.notifications().is_empty());
    }

    #[tokio::test]
    async fn clearing_product_skips_lookup() {
        let (sync, mock) = setup(vec![]);
        sync.select_product("router-x").await;

        sync.select_product("  ").await;

        assert!(sync.selected_product().is_none());
        assert!(sync.suggestions().is_empty());
        assert_eq!(mock.calls("suggestions"), 1);
    }

    #[tokio::test]
    async fn suggestion_is_sent_for_selected_product() {
        let (sync, mock) = setup(vec![chat("a", &[])]);
        sync.initialize().await.unwrap();
        sync.select_product("modem-y").await;
        let suggestion = sync.suggestions()[0].clone();

        sync.send_suggestion(&suggestion).await.unwrap();

        assert!(sync.suggestions().is_empty());
        let server = mock.server_chat("a").unwrap();
        assert_eq!(server.messages[0].text, suggestion);
        assert_eq!(server.messages[0].product_id.as_deref(), Some("modem-y"));
    }
}
