mod console;
mod shutdown;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use popchat_core::{
    client::{
        self, ClientConfig,
        media::{MediaSource, SyntheticMedia, UnavailableMedia},
        rtc::RtcConnector,
    },
    protocol::{DEFAULT_GENERATION_MODEL, DEFAULT_STUN_SERVERS, SIGNAL_PATH},
    server::{self, ServerConfig, generation::GeminiConfig},
    types::{Interests, signaling_url},
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// PopChat: anonymous one-to-one video chat.
///
/// `serve` runs the signaling relay; `peer` runs a headless chat client
/// driven from the terminal.
#[derive(Parser, Debug)]
#[command(name = "popchat", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the signaling server.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "0.0.0.0:3000", env = "POPCHAT_BIND")]
        bind: SocketAddr,

        /// Directory with the built web client, served with an index.html fallback.
        #[arg(long, env = "POPCHAT_STATIC_DIR")]
        static_dir: Option<PathBuf>,

        /// API key for translation and icebreakers; both are disabled without it.
        #[arg(long, env = "POPCHAT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Text generation model.
        #[arg(long, default_value = DEFAULT_GENERATION_MODEL, env = "POPCHAT_MODEL")]
        model: String,
    },

    /// Run a headless chat peer.
    Peer {
        /// Origin of the signaling server (http, https, ws or wss).
        #[arg(long, default_value = "http://localhost:3000", env = "POPCHAT_SERVER")]
        server: String,

        /// Interest tags used by /find and --find.
        #[arg(long, env = "POPCHAT_INTERESTS", value_delimiter = ',')]
        interests: Vec<String>,

        /// Start searching immediately.
        #[arg(long)]
        find: bool,

        /// STUN server URL(s).
        #[arg(long, env = "POPCHAT_STUN", value_delimiter = ',')]
        stun: Vec<String>,

        /// Refuse camera/microphone access.
        #[arg(long)]
        no_media: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Mode::Serve {
            bind,
            static_dir,
            api_key,
            model,
        } => {
            let gemini = api_key
                .filter(|key| !key.trim().is_empty())
                .map(|key| GeminiConfig {
                    model,
                    ..GeminiConfig::new(key)
                });
            server::run(
                ServerConfig {
                    bind,
                    static_dir,
                    gemini,
                },
                shutdown::wait_logged(),
            )
            .await
        }
        Mode::Peer {
            server,
            interests,
            find,
            stun,
            no_media,
        } => {
            let url = signaling_url(&server, SIGNAL_PATH)
                .with_context(|| format!("invalid server origin {server}"))?;
            let interests = Interests::new(interests);
            let stun = match stun.is_empty() {
                true => DEFAULT_STUN_SERVERS.iter().map(|s| s.to_string()).collect(),
                false => stun,
            };
            let media: Arc<dyn MediaSource> = match no_media {
                true => Arc::new(UnavailableMedia),
                false => Arc::new(SyntheticMedia::default()),
            };

            let mut config = ClientConfig::new(url);
            config.auto_find = find.then(|| interests.clone());

            let (intents_tx, intents) = mpsc::unbounded_channel();
            let (notifications, notifications_rx) = mpsc::unbounded_channel();
            tokio::spawn(console::print_notifications(notifications_rx));
            tokio::spawn(console::read_intents(interests, intents_tx));
            println!("{}", console::HELP);

            client::run(
                config,
                media,
                Arc::new(RtcConnector::new(stun)),
                intents,
                notifications,
                shutdown::wait_logged(),
            )
            .await
        }
    }
}
