use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use danaid_auth::signer::generate_key_files;
use danaid_auth::{AuthConfig, AuthError, AuthenticationProtocol, JsonFileAccountStore, TokenIssuer};
use danaid_client::{derive_password_key, ClientIdentity, Messenger};
use danaid_crypto::hash::display_fingerprint;
use danaid_crypto::kdf::PasswordKdfParams;
use danaid_proto::validate_username;

#[derive(Parser)]
#[command(name = "danaid")]
#[command(about = "Danaid Chat: server keys, registration, login and a local chat demo", long_about = None)]
struct Cli {
    /// JSON config file (see AuthConfig); DANAID_* env vars override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Put keys and account data under this directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the server integrity key pair and token secret
    ServerKeygen {
        /// Replace existing keys (invalidates every stored account signature)
        #[arg(long)]
        force: bool,
    },

    /// Create an identity key and register an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Log in with challenge-response and print the issued token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Encrypt a message between two local users and decrypt it on both sides
    ChatDemo {
        #[arg(long)]
        me: String,
        #[arg(long)]
        friend: String,
        #[arg(long, default_value = "hi")]
        message: String,
        /// Number of messages to send
        #[arg(long, default_value = "1")]
        count: u32,
    },
}

fn load_config(cli: &Cli) -> Result<AuthConfig> {
    let mut config = AuthConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.keys_dir = dir.join("keys");
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn protocol(config: &AuthConfig) -> Result<AuthenticationProtocol> {
    let store = JsonFileAccountStore::open(&config.data_dir)
        .with_context(|| format!("open account store in {}", config.data_dir.display()))?;
    Ok(AuthenticationProtocol::from_config(config, Arc::new(store)))
}

/// Identity key file for `username`. The name is validated first so it can
/// never step outside the identities directory.
fn identity_path(config: &AuthConfig, username: &str) -> Result<PathBuf> {
    validate_username(username).with_context(|| format!("username {username:?}"))?;
    Ok(config.identities_dir().join(format!("{username}.pem")))
}

/// Turn an auth failure into the detailed log line plus the generic refusal.
fn refuse(e: AuthError) -> anyhow::Error {
    tracing::warn!(target: "danaid_cli", event = "request_refused", kind = ?e.kind(), error = %e);
    anyhow!("{} ({:?})", e.public_message(), e.kind())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::ServerKeygen { force } => {
            let public = generate_key_files(&config, force)?;
            let fresh_secret = TokenIssuer::generate_secret_file(&config, force)?;
            let fingerprint = public.fingerprint()?;
            println!("server key fingerprint: {}", display_fingerprint(&fingerprint));
            println!("keys directory: {}", config.keys_dir.display());
            if !fresh_secret {
                println!("token secret: kept existing {}", config.token_secret_path().display());
            }
        }

        Commands::Register { username, password } => {
            let path = identity_path(&config, &username)?;
            if path.exists() {
                return Err(anyhow!("identity key already exists at {}", path.display()));
            }
            let protocol = protocol(&config)?;
            let identity = ClientIdentity::generate(&username);
            let key = derive_password_key(&password, &username, PasswordKdfParams::default())?;

            let response = protocol
                .register(&identity.register_request(key.as_slice())?)
                .map_err(refuse)?;
            identity.save(&path)?;

            tracing::info!(target: "danaid_cli", event = "identity_saved", path = %path.display());
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Login { username, password } => {
            let path = identity_path(&config, &username)?;
            let identity = ClientIdentity::load(&username, &path)
                .with_context(|| format!("load identity key {}", path.display()))?;
            let protocol = protocol(&config)?;
            let key = derive_password_key(&password, &username, PasswordKdfParams::default())?;

            let start = protocol.start(&username).map_err(refuse)?;
            let response = protocol
                .finish(&identity.login_finish_request(key.as_slice(), &start))
                .map_err(refuse)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::ChatDemo {
            me,
            friend,
            message,
            count,
        } => {
            let sender = Messenger::new(&me);
            let receiver = Messenger::new(&friend);

            for i in 1..=count.max(1) {
                let text = if count > 1 {
                    format!("{message} #{i}")
                } else {
                    message.clone()
                };
                let envelope = sender.encrypt_for_friend(&friend, &text)?;
                println!("{}", envelope.to_json()?);

                let received = receiver.decrypt_from_friend(&me, &envelope)?;
                let own = sender.decrypt_own_sent(&friend, &envelope)?;
                println!("{friend} read: {received}");
                println!("{me} re-read own message: {own}");
            }
        }
    }

    Ok(())
}
