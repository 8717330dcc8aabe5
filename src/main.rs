use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use smart_support_client::api::{AuthApi, HttpAdminService, HttpChatService};
use smart_support_client::auth::{AuthContext, CredentialStore, FileCredentialStore, Identity, Role};
use smart_support_client::config::Config;
use smart_support_client::errors::ClientError;
use smart_support_client::models::TokenResponse;
use smart_support_client::service::admin_desk::CLEAR_FAILED_PROMPT;
use smart_support_client::service::session_sync::{DELETE_ALL_PROMPT, DELETE_ONE_PROMPT};
use smart_support_client::service::{AdminDesk, NotificationQueue, SessionSync};
use smart_support_client::shell::{self, Command, HELP};

type Input = Lines<BufReader<Stdin>>;

const TYPING_DELAY: Duration = Duration::from_millis(300);

/// What the signed-in user is working in, decided by their role.
enum Desk {
    SignedOut,
    Chat(SessionSync),
    Admin(AdminDesk),
}

impl Desk {
    fn notifications(&self) -> Option<&NotificationQueue> {
        match self {
            Desk::SignedOut => None,
            Desk::Chat(sync) => Some(sync.notifications()),
            Desk::Admin(admin) => Some(admin.notifications()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Logs go to stderr so they do not interleave with the chat
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_support_client=info".into()),
        )
        .init();

    let config = Config::from_env();
    info!("Using support backend at {}", config.api_base_url);

    // ── Auth ──────────────────────────────────────────────────────────────────
    let store = FileCredentialStore::new(config.credentials_path.clone());
    let auth_api = AuthApi::new(&config)?;
    let mut auth = AuthContext::new();
    auth.restore(&store);

    let mut desk = match auth.identity() {
        Some(_) => open_desk(&config, &auth).await?,
        None => {
            println!("Sign in with /login <user> <password> or /register <user> <password>.");
            Desk::SignedOut
        }
    };

    // ── Command loop ──────────────────────────────────────────────────────────
    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input.next_line().await? {
        let command = match shell::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Login { username, password } => {
                let result = auth_api.login(&username, &password).await;
                desk = sign_in(&config, &mut auth, &store, result).await?;
            }
            Command::Register { username, password } => {
                let result = auth_api.register(&username, &password).await;
                desk = sign_in(&config, &mut auth, &store, result).await?;
            }
            Command::Logout => {
                if let Err(e) = auth.logout(&store) {
                    warn!("{e}");
                }
                desk = Desk::SignedOut;
                println!("Signed out.");
            }
            command => match &desk {
                Desk::Chat(sync) => run_chat_command(sync, command, &mut input).await?,
                Desk::Admin(admin) => run_admin_command(admin, command, &mut input).await?,
                Desk::SignedOut => println!("Sign in first (/login or /register)."),
            },
        }

        if let Some(notifications) = desk.notifications() {
            for notification in notifications.drain() {
                println!("! {}", notification.text);
            }
        }
    }

    Ok(())
}

/// Stores the token from a login or registration and opens the user's desk.
async fn sign_in(
    config: &Config,
    auth: &mut AuthContext,
    store: &dyn CredentialStore,
    result: Result<TokenResponse, ClientError>,
) -> anyhow::Result<Desk> {
    let token = match result {
        Ok(token) => token,
        Err(e) => {
            println!("{}", e.detail().map(str::to_owned).unwrap_or_else(|| e.to_string()));
            return Ok(Desk::SignedOut);
        }
    };
    if let Err(e) = auth.login(&token.access_token, store) {
        println!("Could not sign in: {e}");
        return Ok(Desk::SignedOut);
    }
    open_desk(config, auth).await
}

/// Users get the chat, admins get document and analytics management.
async fn open_desk(config: &Config, auth: &AuthContext) -> anyhow::Result<Desk> {
    match auth.require_role(Role::User) {
        Ok(identity) => open_chat(config, identity.clone()).await,
        Err(ClientError::Forbidden { role }) => match auth.require_role(Role::Admin) {
            Ok(identity) => open_admin(config, identity.clone()).await,
            Err(_) => {
                println!("Signed in as {role}, which has nothing to use in this client.");
                Ok(Desk::SignedOut)
            }
        },
        Err(e) => {
            println!("{e}");
            Ok(Desk::SignedOut)
        }
    }
}

async fn open_chat(config: &Config, identity: Identity) -> anyhow::Result<Desk> {
    let service = HttpChatService::new(config, identity.token.clone())?;
    let notifications = NotificationQueue::new(config.notification_ttl);
    let sync = SessionSync::new(Arc::new(service), identity, notifications);

    // Failures are already queued as notifications
    let _ = sync.initialize().await;
    let _ = sync.load_products().await;

    println!("Welcome, {}.", sync.identity().username);
    print_log(&sync);
    let products = sync.products();
    if !products.is_empty() {
        println!("Products: {}. Pick one with /product <id>.", products.join(", "));
    }
    Ok(Desk::Chat(sync))
}

async fn open_admin(config: &Config, identity: Identity) -> anyhow::Result<Desk> {
    let service = HttpAdminService::new(config, identity.token.clone())?;
    let notifications = NotificationQueue::new(config.notification_ttl);
    let admin = AdminDesk::new(Arc::new(service), identity, notifications);

    let _ = admin.refresh().await;

    println!("Welcome Admin {}.", admin.identity().username);
    println!("{}", shell::render_documents(&admin.products()));
    Ok(Desk::Admin(admin))
}

async fn run_chat_command(
    sync: &SessionSync,
    command: Command,
    input: &mut Input,
) -> anyhow::Result<()> {
    match command {
        Command::NewChat => {
            if sync.create_session(true).await.is_ok() {
                print_log(sync);
            }
        }
        Command::ListChats => {
            let active = sync.active_session().map(|s| s.id);
            println!("{}", shell::render_chat_list(&sync.sessions(), active.as_deref()));
        }
        Command::Open(index) => match sync.sessions().get(index) {
            Some(target) => {
                let _ = sync.select_session(target).await;
                print_log(sync);
            }
            None => println!("No chat #{}", index + 1),
        },
        Command::Delete(index) => match sync.sessions().get(index) {
            Some(target) => {
                let confirmed = ask(DELETE_ONE_PROMPT, input).await?;
                if sync.delete_session(&target.id, &|_: &str| confirmed).await.is_ok() && confirmed {
                    println!("Deleted \"{}\".", target.display_title());
                }
            }
            None => println!("No chat #{}", index + 1),
        },
        Command::DeleteAll => {
            let confirmed = ask(DELETE_ALL_PROMPT, input).await?;
            if sync.delete_all_sessions(&|_: &str| confirmed).await.is_ok() && confirmed {
                print_log(sync);
            }
        }
        Command::Products => {
            let _ = sync.load_products().await;
            let selected = sync.selected_product();
            for product in sync.products() {
                let marker = if Some(&product) == selected.as_ref() { '*' } else { ' ' };
                println!("{marker} {product}");
            }
        }
        Command::Product(product_id) => {
            sync.select_product(&product_id).await;
            for (i, suggestion) in sync.suggestions().iter().enumerate() {
                println!("  {}. {suggestion}", i + 1);
            }
        }
        Command::Suggest(index) => match sync.suggestions().get(index).cloned() {
            Some(suggestion) => ask_question(sync, &suggestion, true).await,
            None => println!("No suggestion #{}", index + 1),
        },
        Command::Ask(question) => ask_question(sync, &question, false).await,
        Command::Documents
        | Command::Analytics
        | Command::Upload(_)
        | Command::RemoveFile(_)
        | Command::ClearFailedQueries => println!("That command needs an admin account."),
        Command::Login { .. }
        | Command::Register { .. }
        | Command::Logout
        | Command::Help
        | Command::Quit
        | Command::Empty => {}
    }
    Ok(())
}

async fn run_admin_command(
    admin: &AdminDesk,
    command: Command,
    input: &mut Input,
) -> anyhow::Result<()> {
    match command {
        Command::Documents => {
            if admin.load_products().await.is_ok() {
                println!("{}", shell::render_documents(&admin.products()));
            }
        }
        Command::Analytics => {
            let _ = admin.load_analytics().await;
            if let Some(analytics) = admin.analytics() {
                println!("{}", shell::render_analytics(&analytics));
            }
        }
        Command::Upload(paths) => {
            if admin.upload(&paths).await.is_ok() {
                println!("{}", shell::render_documents(&admin.products()));
            }
        }
        Command::RemoveFile(file_id) => {
            let _ = admin.delete_file(&file_id).await;
        }
        Command::ClearFailedQueries => {
            let confirmed = ask(CLEAR_FAILED_PROMPT, input).await?;
            let _ = admin.clear_failed_queries(&|_: &str| confirmed).await;
        }
        Command::Ask(_) => println!("Admins cannot ask questions. Try /help."),
        Command::NewChat
        | Command::ListChats
        | Command::Open(_)
        | Command::Delete(_)
        | Command::DeleteAll
        | Command::Products
        | Command::Product(_)
        | Command::Suggest(_) => println!("That command needs a user account."),
        Command::Login { .. }
        | Command::Register { .. }
        | Command::Logout
        | Command::Help
        | Command::Quit
        | Command::Empty => {}
    }
    Ok(())
}

async fn ask_question(sync: &SessionSync, question: &str, from_suggestion: bool) {
    let send = async {
        if from_suggestion {
            sync.send_suggestion(question).await
        } else {
            let product_id = sync.selected_product().unwrap_or_default();
            sync.send_message(question, &product_id).await
        }
    };
    tokio::pin!(send);

    let result = tokio::select! {
        result = &mut send => result,
        _ = tokio::time::sleep(TYPING_DELAY) => {
            if sync.is_composing() {
                println!("(bot is typing...)");
            }
            (&mut send).await
        }
    };

    if result.is_ok() {
        let messages = sync.messages();
        for message in shell::latest_exchange(&messages, question) {
            println!("{}", shell::render_message(message));
        }
    }
}

async fn ask(prompt: &str, input: &mut Input) -> anyhow::Result<bool> {
    println!("{prompt} [y/N]");
    let answer = input.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_log(sync: &SessionSync) {
    if let Some(active) = sync.active_session() {
        println!("── {} ──", active.display_title());
        for message in &active.messages {
            println!("{}", shell::render_message(message));
        }
    }
}
