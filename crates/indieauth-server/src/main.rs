//! IndieAuth Server - Entry Point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use indieauth_server::config::{Config, ObjectStoreConfig, StoreBackend, TokenMode, defaults};
use indieauth_server::{Engine, server::AuthServer};

#[derive(Parser, Debug)]
#[command(name = "indieauth-server")]
#[command(about = "IndieAuth authorization and token endpoints")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = defaults::BIND_ADDR, env = "INDIEAUTH_BIND")]
    bind: SocketAddr,

    /// Access token mode
    #[arg(long, default_value = "stateless", env = "INDIEAUTH_TOKEN_MODE")]
    token_mode: Mode,

    /// JWT signing algorithm (HS256, HS384, HS512)
    #[arg(long, default_value = defaults::TOKEN_ALGORITHM, env = "INDIEAUTH_TOKEN_ALGORITHM")]
    token_algorithm: String,

    /// JWT signing secret (required for stateless tokens)
    #[arg(long, env = "INDIEAUTH_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// JWT lifetime in seconds; tokens never expire when unset
    #[arg(long, env = "INDIEAUTH_TOKEN_LIFETIME")]
    token_lifetime: Option<u64>,

    /// Salt appended to passwords before hashing
    #[arg(long, default_value = "", env = "INDIEAUTH_PASSWORD_SALT", hide_env_values = true)]
    password_salt: String,

    /// JSON file mapping identity URLs to password hashes
    #[arg(long, env = "INDIEAUTH_PASSWORDS")]
    passwords: Option<PathBuf>,

    /// Allow approvals without a password
    #[arg(long, env = "INDIEAUTH_NO_PASSWORD")]
    no_password: bool,

    /// Credential store backend
    #[arg(long, default_value = "memory", env = "INDIEAUTH_STORE")]
    store: Backend,

    /// Database directory for the document store
    #[arg(long, default_value = "indieauth.db", env = "INDIEAUTH_DB_PATH")]
    db_path: PathBuf,

    /// Object store endpoint URL
    #[arg(long, env = "INDIEAUTH_S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// Object store bucket
    #[arg(long, env = "INDIEAUTH_S3_BUCKET")]
    s3_bucket: Option<String>,

    /// Bearer token for the object store
    #[arg(long, env = "INDIEAUTH_S3_TOKEN", hide_env_values = true)]
    s3_token: Option<String>,

    /// Object store request timeout in seconds
    #[arg(long, env = "INDIEAUTH_S3_TIMEOUT")]
    s3_timeout: Option<u64>,

    /// Authorization code lifetime in seconds
    #[arg(long, env = "INDIEAUTH_CODE_TTL")]
    code_ttl: Option<u64>,

    /// Stored token lifetime in seconds; tokens are kept forever when unset
    #[arg(long, env = "INDIEAUTH_TOKEN_TTL")]
    token_ttl: Option<u64>,

    /// Accept token requests whose `me` differs from the approved one
    #[arg(long, env = "INDIEAUTH_ALLOW_SUBJECT_MISMATCH")]
    allow_subject_mismatch: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Mode {
    /// Signed JWTs, nothing stored
    #[default]
    Stateless,
    /// Random tokens kept in the store
    Stateful,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Backend {
    /// In-process TTL cache
    #[default]
    Memory,
    /// Embedded sled database
    Document,
    /// S3-compatible bucket
    Object,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let token_mode = match self.token_mode {
            Mode::Stateless => TokenMode::Stateless {
                algorithm: self.token_algorithm,
                secret: self.token_secret.unwrap_or_default(),
                lifetime: self.token_lifetime.map(Duration::from_secs),
            },
            Mode::Stateful => TokenMode::Stateful,
        };

        let mut config = Config::new(token_mode, self.password_salt);
        config.passwords_path = self.passwords;
        config.require_password = !self.no_password;
        config.require_subject_match = !self.allow_subject_mismatch;
        config.token_ttl = self.token_ttl.map(Duration::from_secs);
        if let Some(secs) = self.code_ttl {
            config.code_ttl = Duration::from_secs(secs);
        }

        config.store = match self.store {
            Backend::Memory => StoreBackend::Memory,
            Backend::Document => StoreBackend::Document { path: self.db_path },
            Backend::Object => {
                let endpoint = self.s3_endpoint.ok_or_else(|| anyhow::anyhow!("--s3-endpoint is required"))?;
                let bucket = self.s3_bucket.ok_or_else(|| anyhow::anyhow!("--s3-bucket is required"))?;
                let mut settings = ObjectStoreConfig::new(endpoint, bucket);
                settings.auth_token = self.s3_token;
                if let Some(secs) = self.s3_timeout {
                    settings.timeout = Duration::from_secs(secs);
                }
                StoreBackend::Object(settings)
            }
        };

        Ok(config)
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let bind = cli.bind;
    let config = cli.into_config()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        stateful_tokens = config.stores_tokens(),
        store = config.store.name(),
        "Starting IndieAuth server"
    );

    let engine = Engine::from_config(&config)?;

    AuthServer::new(engine).run_http(bind).await
}
