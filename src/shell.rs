use std::path::PathBuf;

use thiserror::Error;

use crate::models::{Analytics, ChatSession, Message, ProductMetadata, Sender};

pub const HELP: &str = "\
Commands:
  /login <user> <password>     sign in
  /register <user> <password>  create an account and sign in
  /logout                      sign out
  /new                         start a new chat
  /chats                       list chats
  /open <n>                    open chat n
  /delete <n>                  delete chat n
  /clear                       delete all chats
  /products                    list products
  /product <id>                ask about product <id>
  /suggest <n>                 send suggested question n
Admin commands:
  /documents                   list uploaded documents per product
  /analytics                   show usage analytics
  /upload <file.pdf>...        upload documents
  /remove <file_id>            delete a document
  /clear-failed                clear the failed-query log
  /help                        show this help
  /quit                        exit
Anything else is sent as a question.";

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Register { username: String, password: String },
    Logout,
    NewChat,
    ListChats,
    /// Zero-based index into the chat list.
    Open(usize),
    Delete(usize),
    DeleteAll,
    Products,
    Product(String),
    Suggest(usize),
    Documents,
    Analytics,
    Upload(Vec<PathBuf>),
    RemoveFile(String),
    ClearFailedQueries,
    Help,
    Quit,
    Ask(String),
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command '/{0}', try /help")]
    Unknown(String),
}

pub fn parse(line: &str) -> Result<Command, ShellError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Ask(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match (name, args.as_slice()) {
        ("login", [user, pass]) => {
            Ok(Command::Login { username: user.to_string(), password: pass.to_string() })
        }
        ("login", _) => Err(ShellError::Usage("/login <user> <password>")),
        ("register", [user, pass]) => {
            Ok(Command::Register { username: user.to_string(), password: pass.to_string() })
        }
        ("register", _) => Err(ShellError::Usage("/register <user> <password>")),
        ("logout", []) => Ok(Command::Logout),
        ("new", []) => Ok(Command::NewChat),
        ("chats", []) => Ok(Command::ListChats),
        ("open", [n]) => index(n).map(Command::Open).ok_or(ShellError::Usage("/open <n>")),
        ("open", _) => Err(ShellError::Usage("/open <n>")),
        ("delete", [n]) => index(n).map(Command::Delete).ok_or(ShellError::Usage("/delete <n>")),
        ("delete", _) => Err(ShellError::Usage("/delete <n>")),
        ("clear", []) => Ok(Command::DeleteAll),
        ("products", []) => Ok(Command::Products),
        ("product", [id]) => Ok(Command::Product(id.to_string())),
        ("product", _) => Err(ShellError::Usage("/product <id>")),
        ("suggest", [n]) => index(n).map(Command::Suggest).ok_or(ShellError::Usage("/suggest <n>")),
        ("suggest", _) => Err(ShellError::Usage("/suggest <n>")),
        ("documents", []) => Ok(Command::Documents),
        ("analytics", []) => Ok(Command::Analytics),
        ("upload", []) => Err(ShellError::Usage("/upload <file.pdf>...")),
        ("upload", paths) => Ok(Command::Upload(paths.iter().map(PathBuf::from).collect())),
        ("remove", [file_id]) => Ok(Command::RemoveFile(file_id.to_string())),
        ("remove", _) => Err(ShellError::Usage("/remove <file_id>")),
        ("clear-failed", []) => Ok(Command::ClearFailedQueries),
        ("help", _) => Ok(Command::Help),
        ("quit" | "exit", _) => Ok(Command::Quit),
        (other, _) => Err(ShellError::Unknown(other.to_string())),
    }
}

/// Users count from 1.
fn index(raw: &str) -> Option<usize> {
    raw.parse::<usize>().ok().and_then(|n| n.checked_sub(1))
}

pub fn render_message(message: &Message) -> String {
    let mut line = format!("[{}] {}: {}", message.local_time(), message.sender, message.text);
    if !message.sources.is_empty() {
        line.push_str(&format!("\n    sources: {}", message.sources.join(", ")));
    }
    line
}

/// The tail of `messages` starting at the last time the user asked
/// `question`, or the whole log if it is not there. Replies replace the log
/// wholesale, so the question's position is not known in advance.
pub fn latest_exchange<'a>(messages: &'a [Message], question: &str) -> &'a [Message] {
    let start = messages
        .iter()
        .rposition(|m| m.sender == Sender::User && m.text == question)
        .unwrap_or(0);
    &messages[start..]
}

pub fn render_chat_list(sessions: &[ChatSession], active_id: Option<&str>) -> String {
    if sessions.is_empty() {
        return "No conversations yet".to_string();
    }
    sessions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let marker = if Some(s.id.as_str()) == active_id { '*' } else { ' ' };
            format!("{marker} {:>2}. {}", i + 1, s.display_title())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_documents(products: &[ProductMetadata]) -> String {
    if products.is_empty() {
        return "No documents uploaded yet".to_string();
    }
    let mut out = Vec::new();
    for product in products {
        out.push(format!("{} [{}]", product.display_name(), product.product_id));
        for file in &product.files {
            let size = file.size.map(|n| format!(", {n} bytes")).unwrap_or_default();
            out.push(format!("    {}  {} ({} chunks{size})", file.file_id, file.file_name, file.chunks));
        }
    }
    out.join("\n")
}

pub fn render_analytics(analytics: &Analytics) -> String {
    let mut out = vec![
        format!("Users: {}", analytics.total_users),
        format!("Queries: {}", analytics.total_queries()),
    ];
    for (product, count) in &analytics.queries_per_product {
        out.push(format!("  {product}: {count}"));
    }
    out.push(format!("Failed queries: {}", analytics.failed_queries.len()));
    for failed in &analytics.failed_queries {
        out.push(format!("  [{}] {}", failed.product_id, failed.query));
    }
    out.join("\n")
}
