use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Offset applied when rendering timestamps for the support desk (UTC+05:30).
const DISPLAY_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

const UNTITLED: &str = "Untitled Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    /// The backend stores its own replies as `assistant`.
    #[serde(alias = "assistant")]
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a chat's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub product_id: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Message {
    /// A question typed by the user, not yet acknowledged by the server.
    pub fn user(text: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
            product_id: Some(product_id.into()),
            sources: Vec::new(),
        }
    }

    /// The greeting shown at the top of a freshly created chat.
    pub fn welcome(username: &str) -> Self {
        let name = if username.trim().is_empty() { "there" } else { username };
        Self {
            sender: Sender::Bot,
            text: format!("Hi {name} 👋, this is a new chat!"),
            timestamp: Utc::now(),
            product_id: None,
            sources: Vec::new(),
        }
    }

    pub fn local_time(&self) -> String {
        format_local_time(&self.timestamp)
    }
}

/// A chat conversation as stored by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ChatSession {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => UNTITLED,
        }
    }
}

/// Body of `POST /chat/{id}/message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRequest {
    pub chat_id: String,
    pub product_id: String,
    pub question: String,
}

/// Reply to `POST /chat/{id}/message`: the authoritative message log, usually
/// wrapped in the full updated session record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl MessageReply {
    /// The updated session record, when the server sent one.
    pub fn session(&self) -> Option<ChatSession> {
        self.id.as_ref().map(|id| ChatSession {
            id: id.clone(),
            title: self.title.clone(),
            messages: self.messages.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductList {
    #[serde(default)]
    pub products: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuggestionList {
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Login and registration share the same body.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub username: String,
    pub role: String,
    pub access_token: String,
}

// ── Admin ────────────────────────────────────────────────────────────────────

/// One ingested document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub chunks: u64,
    #[serde(default)]
    pub uploaded_at: Option<String>,
    /// Bytes, when the server still has the raw file.
    #[serde(default)]
    pub size: Option<u64>,
}

/// A product and the documents its answers are drawn from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductMetadata {
    pub product_id: String,
    #[serde(default)]
    pub files: Vec<FileMetadata>,
}

impl ProductMetadata {
    /// Products are shown under their first document's name.
    pub fn display_name(&self) -> &str {
        self.files.first().map(|f| f.file_name.as_str()).unwrap_or(&self.product_id)
    }

    /// Keeps the first entry for each `file_id`.
    pub fn dedup_files(&mut self) {
        let mut seen = HashSet::new();
        self.files.retain(|f| seen.insert(f.file_id.clone()));
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductsMetadata {
    #[serde(default)]
    pub products: Vec<ProductMetadata>,
}

/// A question the assistant could not answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FailedQuery {
    pub product_id: String,
    pub query: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Analytics {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub failed_queries: Vec<FailedQuery>,
    #[serde(default)]
    pub queries_per_product: BTreeMap<String, u64>,
}

impl Analytics {
    pub fn total_queries(&self) -> u64 {
        self.queries_per_product.values().sum()
    }
}

/// Reply to `POST /admin/upload`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    #[serde(default)]
    pub file: Option<FileMetadata>,
}

/// A bare `{"message": ...}` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct Acknowledgement {
    pub message: String,
}

/// FastAPI error body. `detail` is a string for handled errors and a list of
/// field problems for request validation failures.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn into_detail(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

/// Formats a UTC instant as a 12-hour wall-clock time at the display offset.
pub fn format_local_time(ts: &DateTime<Utc>) -> String {
    match FixedOffset::east_opt(DISPLAY_OFFSET_SECS) {
        Some(offset) => ts.with_timezone(&offset).format("%I:%M %p").to_string(),
        None => ts.format("%I:%M %p").to_string(),
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

/// The backend writes naive ISO-8601 UTC timestamps (no offset); the client
/// writes RFC 3339. Both are accepted.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        raw.parse::<NaiveDateTime>()
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
    }
}
