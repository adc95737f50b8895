use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt::Display, str::FromStr, time::Duration};

use crate::services::build_tracker::BuildLimits;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Prefix of every published URL, e.g. `https://sites.example.com`.
    pub public_base_url: String,
    pub max_concurrent_builds: u32,
    pub max_builds_per_day: u32,
    pub build_timeout_secs: u64,
    /// Bearer token required on the build API when set.
    pub api_token: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Personal brand site builder API")]
pub struct Args {
    /// Host to bind to (overrides SITE_BUILDER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SITE_BUILDER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where published sites are stored (overrides SITE_BUILDER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides SITE_BUILDER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL published sites are served from (overrides SITE_BUILDER_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Builds a user may have queued or running at once (overrides SITE_BUILDER_MAX_CONCURRENT_BUILDS)
    #[arg(long)]
    pub max_concurrent_builds: Option<u32>,

    /// Builds a user may start per 24 hours (overrides SITE_BUILDER_MAX_BUILDS_PER_DAY)
    #[arg(long)]
    pub max_builds_per_day: Option<u32>,

    /// Seconds before a running build is failed (overrides SITE_BUILDER_BUILD_TIMEOUT_SECS)
    #[arg(long)]
    pub build_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let defaults = BuildLimits::default();

        // --- Environment fallback ---
        let env_host = env::var("SITE_BUILDER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("SITE_BUILDER_PORT", 3000)?;
        let env_storage =
            env::var("SITE_BUILDER_STORAGE_DIR").unwrap_or_else(|_| "./data/sites".into());
        let env_db = env::var("SITE_BUILDER_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/site_builder.db".into());
        let env_max_concurrent =
            env_parse("SITE_BUILDER_MAX_CONCURRENT_BUILDS", defaults.max_concurrent)?;
        let env_max_per_day = env_parse("SITE_BUILDER_MAX_BUILDS_PER_DAY", defaults.max_per_day)?;
        let env_timeout = env_parse("SITE_BUILDER_BUILD_TIMEOUT_SECS", 300)?;

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let public_base_url = args.public_base_url.unwrap_or_else(|| {
            env::var("SITE_BUILDER_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port))
        });
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_base_url,
            max_concurrent_builds: args.max_concurrent_builds.unwrap_or(env_max_concurrent),
            max_builds_per_day: args.max_builds_per_day.unwrap_or(env_max_per_day),
            build_timeout_secs: args.build_timeout_secs.unwrap_or(env_timeout),
            api_token: env::var("SITE_BUILDER_API_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
        };

        if cfg.max_concurrent_builds == 0 || cfg.max_builds_per_day == 0 {
            anyhow::bail!("build limits must be at least 1");
        }
        if cfg.build_timeout_secs == 0 {
            anyhow::bail!("build timeout must be at least 1 second");
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn limits(&self) -> BuildLimits {
        BuildLimits {
            max_concurrent: self.max_concurrent_builds,
            max_per_day: self.max_builds_per_day,
        }
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

// Hand-written so the API token never reaches the logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("public_base_url", &self.public_base_url)
            .field("max_concurrent_builds", &self.max_concurrent_builds)
            .field("max_builds_per_day", &self.max_builds_per_day)
            .field("build_timeout_secs", &self.build_timeout_secs)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
