//! CampusConnect CLI
//!
//! Command-line front-end for the CampusConnect client:
//! - Log in and out, show the current session
//! - List conversations, read and send messages
//! - Listen to real-time events
//! - Push a location update

use anyhow::{bail, Context as _, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use campusconnect::api::dto::{MessagesResponse, User};
use campusconnect::chat::{ChatRoom, ConversationFeed, ConversationList, SendOutcome, LOAD_LIMIT};
use campusconnect::location::{ChannelSource, LocationPreference, LocationSample, LocationWatcher, UpdateOutcome};
use campusconnect::logging::{init_logging, with_bootstrap_logging};
use campusconnect::proximity::ProximityListener;
use campusconnect::realtime::{ConnectionManager, RealtimeClient, Subscription, Topic, UserRegistration};
use campusconnect::{generate_default_config, ApiClient, AuthService, Config, FileSessionStore};

#[derive(Parser)]
#[command(name = "campusconnect")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CampusConnect client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: platform config dir, then ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend REST URL, overrides the config file
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Backend socket URL, overrides the config file
    #[arg(long, global = true)]
    pub socket_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in with email and password
    Login { email: String, password: String },

    /// Create an account and log in
    Signup {
        email: String,
        password: String,
        /// Display name
        name: String,
    },

    /// End the session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Check the backend is reachable
    Health,

    /// List conversations
    Conversations,

    /// Show recent messages of a conversation
    Messages {
        conversation_id: String,
        #[arg(short, long, default_value_t = LOAD_LIMIT)]
        limit: u32,
    },

    /// Send a message
    Send { conversation_id: String, text: String },

    /// Print real-time events until interrupted
    Listen,

    /// Turn location sharing on or off
    Sharing {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },

    /// Push a location update
    Locate {
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lng: f64,
        /// Send even when location sharing is off
        #[arg(long)]
        force: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

struct Session {
    config: Config,
    store: Arc<FileSessionStore>,
    api: ApiClient,
    auth: AuthService,
}

/// Load the config file, then apply command-line URL overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(url) = &cli.socket_url {
        config.realtime.url = url.clone();
    }
    Ok(config)
}

impl Session {
    fn open(config: Config) -> Result<Self> {
        let path = config.session.path();
        let store = Arc::new(
            FileSessionStore::open(&path).with_context(|| format!("opening session file {:?}", path))?,
        );
        let api = ApiClient::new(config.api.client_config(), store.clone());
        let auth = AuthService::new(api.clone());

        Ok(Self {
            config,
            store,
            api,
            auth,
        })
    }

    async fn require_user(&self) -> Result<User> {
        match self.auth.hydrate().await {
            Some(user) => Ok(user),
            None => bail!("not logged in (run `campusconnect login`)"),
        }
    }

    fn connection_manager(&self) -> ConnectionManager {
        ConnectionManager::with_websocket(self.config.realtime.client_config(), self.store.clone())
    }
}

fn registration(user: &User) -> UserRegistration {
    UserRegistration {
        user_id: user.uid.clone(),
        username: user.username(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content).with_context(|| format!("writing {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = with_bootstrap_logging(|| load_config(&cli))?;
    init_logging(&config.logging).context("installing log subscriber")?;
    let session = Session::open(config)?;

    match cli.command {
        Commands::Login { email, password } => {
            let user = session.auth.login(&email, &password).await?;
            println!("Logged in as {} ({})", user.username(), user.role_or_default());
        }

        Commands::Signup {
            email,
            password,
            name,
        } => {
            let user = session.auth.signup(&email, &password, &name).await?;
            println!("Welcome, {}", user.display_name.as_deref().unwrap_or(&name));
        }

        Commands::Logout => {
            session.auth.logout().await;
            println!("Logged out");
        }

        Commands::Whoami => {
            let user = session.require_user().await?;
            let preference = LocationPreference::new(session.api.clone()).with_cache(session.store.clone());
            let sharing = preference.load(true).await;

            println!("User:     {}", user.username());
            println!("Id:       {}", user.uid);
            println!("Role:     {}", session.auth.role().await);
            println!("Location: {}", if sharing { "shared" } else { "off" });
        }

        Commands::Health => match session.api.check_health().await {
            Ok(ok) => println!("OK ({}): {}", ok.status, ok.data),
            Err(f) => bail!("backend unavailable: {}", f),
        },

        Commands::Conversations => {
            session.require_user().await?;
            let mut list = ConversationList::new();
            list.load(&session.api).await?;

            if list.conversations().is_empty() {
                println!("No conversations yet");
            }
            for c in list.conversations() {
                let title = c
                    .name
                    .clone()
                    .or_else(|| c.kind.clone())
                    .unwrap_or_else(|| "conversation".to_string());
                let unread = if c.unread_count > 0 {
                    format!(" [{} unread]", c.unread_count)
                } else {
                    String::new()
                };
                println!(
                    "{:<24} {}{}  {}",
                    c.id,
                    title,
                    unread,
                    c.last_message.as_deref().unwrap_or("")
                );
            }
            println!("\n{} with unread messages", list.total_unread_chats());
        }

        Commands::Messages {
            conversation_id,
            limit,
        } => {
            session.require_user().await?;
            let body: MessagesResponse = session
                .api
                .chat()
                .messages(&conversation_id, Some(limit), None)
                .await?
                .parse()?;

            for m in &body.messages {
                println!(
                    "[{}] {}: {}",
                    m.created_at.as_deref().unwrap_or("-"),
                    m.sender_name.as_deref().unwrap_or("Unknown"),
                    m.content
                );
            }
        }

        Commands::Send {
            conversation_id,
            text,
        } => {
            let user = session.require_user().await?;
            let manager = session.connection_manager();
            let socket = manager.initialize(registration(&user));
            let room = ChatRoom::open(session.api.clone(), socket, &conversation_id).await;

            let outcome = room.send(&text).await;
            room.close();
            manager.disconnect();

            match outcome? {
                SendOutcome::Sent(Some(m)) => println!("Sent ({})", m.id),
                SendOutcome::Sent(None) => println!("Sent"),
                SendOutcome::Blocked(notice) => {
                    bail!("message blocked ({}): {}", notice.action, notice.flags.join(", "))
                }
                SendOutcome::Empty => bail!("nothing to send"),
            }
        }

        Commands::Listen => {
            let user = session.require_user().await?;
            let manager = session.connection_manager();
            let socket = manager.initialize(registration(&user));
            let mut list = ConversationList::new();
            if let Err(f) = list.load(&session.api).await {
                tracing::warn!(status = f.status, "Failed to load conversations");
            }
            let feed = ConversationFeed::start(session.api.clone(), Arc::clone(&socket), list);
            listen(&socket, &feed, &user.uid).await;
            drop(feed);
            manager.disconnect();
        }

        Commands::Sharing { enabled } => {
            let user = session.require_user().await?;
            let preference = LocationPreference::new(session.api.clone()).with_cache(session.store.clone());
            preference.set_enabled(&user.uid, enabled).await?;
            println!("Location sharing {}", if enabled { "on" } else { "off" });
        }

        Commands::Locate { lat, lng, force } => {
            let user = session.require_user().await?;
            let preference = LocationPreference::new(session.api.clone()).with_cache(session.store.clone());
            if !force && !preference.load(true).await {
                bail!("location sharing is off (use `campusconnect sharing true` or --force)");
            }

            let watcher = LocationWatcher::with_gate(
                Arc::new(ChannelSource::new()),
                Arc::new(session.api.clone()),
                session.config.location.gate(),
            );
            match watcher.report(&user.uid, LocationSample::now(lat, lng)).await {
                UpdateOutcome::Sent => println!("Location updated"),
                UpdateOutcome::Skipped => println!("Location unchanged"),
                UpdateOutcome::OutsideGeofence => println!("Outside the campus area, not shared"),
                UpdateOutcome::Failed(f) => bail!("{}", watcher.error().unwrap_or(f.message)),
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Print events until Ctrl-C or the socket closes
async fn listen(socket: &Arc<RealtimeClient>, feed: &ConversationFeed, user_id: &str) {
    let topics = [
        Topic::Connect,
        Topic::Disconnect,
        Topic::Reconnect,
        Topic::NewMessage,
        Topic::UserStatus,
        Topic::UserTyping,
        Topic::ConnectionRequest,
        Topic::ConnectionAccepted,
        Topic::EventCreated,
        Topic::EventUpdated,
    ];

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    for topic in topics {
        forward(socket.on(topic), tx.clone());
    }

    let mut nearby = ProximityListener::new(Arc::clone(socket), user_id);
    let nearby_tx = tx.clone();
    tokio::spawn(async move {
        while let Some(notice) = nearby.next().await {
            if nearby_tx.send(format!("nearby: {}", notice)).is_err() {
                break;
            }
        }
    });
    drop(tx);

    let mut changes = feed.changes();
    println!("Listening as {} (Ctrl-C to stop)", user_id);
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => println!("{}", line),
                None => break,
            },
            Ok(()) = changes.changed() => {
                println!("conversations: {} with unread messages", feed.total_unread_chats());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn forward(mut subscription: Subscription, tx: tokio::sync::mpsc::UnboundedSender<String>) {
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let line = if event.topic.is_lifecycle() {
                event.topic.as_str().to_string()
            } else {
                format!("{}: {}", event.topic.as_str(), event.data)
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}
