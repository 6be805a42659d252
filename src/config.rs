use anyhow::{Context, Result};
use axum::http::HeaderName;
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Identity of the deployment; the default bucket is derived from it.
    pub app_id: String,
    pub bucket: String,
    pub public_base_url: Option<String>,
    pub direct_serve_header: HeaderName,
    pub direct_serve_prefix: String,
    pub stream_blobs: bool,
    pub upload_url_ttl_secs: u64,
    pub storage_timeout_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Avatar upload and caching service")]
pub struct Args {
    /// Host to bind to (overrides AVATARS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides AVATARS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides AVATARS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides AVATARS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Application identity (overrides AVATARS_APP_ID)
    #[arg(long)]
    pub app_id: Option<String>,

    /// Bucket new uploads go to (overrides AVATARS_BUCKET; defaults to `<app-id>.default`)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Absolute origin prepended to upload URLs (overrides AVATARS_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Header carrying the direct-serve marker (overrides AVATARS_DIRECT_SERVE_HEADER)
    #[arg(long)]
    pub direct_serve_header: Option<String>,

    /// Prefix of the direct-serve marker value (overrides AVATARS_DIRECT_SERVE_PREFIX)
    #[arg(long)]
    pub direct_serve_prefix: Option<String>,

    /// Stream blob bodies from the service itself (or AVATARS_STREAM_BLOBS=1)
    #[arg(long)]
    pub stream_blobs: bool,

    /// Lifetime of upload URLs in seconds (overrides AVATARS_UPLOAD_URL_TTL_SECS)
    #[arg(long)]
    pub upload_url_ttl_secs: Option<u64>,

    /// Timeout for each datastore/storage call (overrides AVATARS_STORAGE_TIMEOUT_SECS)
    #[arg(long)]
    pub storage_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_args(args)?, migrate))
    }

    /// Merge parsed CLI args over environment variables and defaults.
    pub fn from_args(args: Args) -> Result<Self> {
        let host = args
            .host
            .unwrap_or_else(|| env_or("AVATARS_HOST", "0.0.0.0"));
        let port = match args.port {
            Some(port) => port,
            None => env_parse("AVATARS_PORT", 8080)?,
        };
        let storage_dir = args
            .storage_dir
            .unwrap_or_else(|| env_or("AVATARS_STORAGE_DIR", "./data/objects"));
        let database_url = args
            .database_url
            .unwrap_or_else(|| env_or("AVATARS_DATABASE_URL", "sqlite://./data/meta/avatars.db"));
        let app_id = args
            .app_id
            .unwrap_or_else(|| env_or("AVATARS_APP_ID", "avatars-local"));
        let bucket = args
            .bucket
            .or_else(|| env::var("AVATARS_BUCKET").ok())
            .unwrap_or_else(|| default_bucket(&app_id));
        let public_base_url = args
            .public_base_url
            .or_else(|| env::var("AVATARS_PUBLIC_BASE_URL").ok())
            .filter(|url| !url.is_empty());
        let header = args
            .direct_serve_header
            .unwrap_or_else(|| env_or("AVATARS_DIRECT_SERVE_HEADER", "X-Accel-Redirect"));
        let direct_serve_header = HeaderName::from_str(&header)
            .with_context(|| format!("invalid direct-serve header name `{}`", header))?;
        let direct_serve_prefix = args
            .direct_serve_prefix
            .unwrap_or_else(|| env_or("AVATARS_DIRECT_SERVE_PREFIX", "/_blobs"));
        let stream_blobs = args.stream_blobs || env_flag("AVATARS_STREAM_BLOBS");
        let upload_url_ttl_secs = match args.upload_url_ttl_secs {
            Some(v) => v,
            None => env_parse("AVATARS_UPLOAD_URL_TTL_SECS", 15 * 60)?,
        };
        let storage_timeout_secs = match args.storage_timeout_secs {
            Some(v) => v,
            None => env_parse("AVATARS_STORAGE_TIMEOUT_SECS", 10)?,
        };

        if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
            anyhow::bail!("invalid bucket name `{}`", bucket);
        }
        if storage_timeout_secs == 0 {
            anyhow::bail!("storage timeout must be at least one second");
        }

        Ok(Self {
            host,
            port,
            storage_dir,
            database_url,
            app_id,
            bucket,
            public_base_url,
            direct_serve_header,
            direct_serve_prefix,
            stream_blobs,
            upload_url_ttl_secs,
            storage_timeout_secs,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

/// Bucket used when none is configured, resolved from the app identity.
pub fn default_bucket(app_id: &str) -> String {
    format!("{}.default", app_id)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.into())
}

fn env_flag(key: &str) -> bool {
    matches!(
        env::var(key).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Ok("1" | "true" | "yes" | "on")
    )
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
