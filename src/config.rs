//! Service configuration, loaded from environment variables.

use std::path::PathBuf;

/// Runtime configuration.
///
/// | Variable              | Default               |
/// |-----------------------|-----------------------|
/// | `OPSBOARD_HOST`       | `0.0.0.0`             |
/// | `OPSBOARD_PORT`       | `8080`                |
/// | `OPSBOARD_DATA_DIR`   | `./data`              |
/// | `OPSBOARD_DEV_MODE`   | `false`               |
/// | `OPSBOARD_ACCESS_KEY` | unset                 |
/// | `JWT_SECRET`          | unset                 |
/// | `JWT_TTL_DAYS`        | `30`                  |
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory holding the SQLite database.
    pub data_dir: PathBuf,
    /// Dev mode: login succeeds with email alone, no access key required.
    pub dev_mode: bool,
    /// Shared instance access key checked at login (outside dev mode).
    pub access_key: Option<String>,
    /// Secret used to sign session JWTs. Required outside dev mode.
    pub jwt_secret: Option<String>,
    pub token_ttl_days: i64,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let dev_mode = env_flag("OPSBOARD_DEV_MODE");
        let jwt_secret = std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());
        let access_key = std::env::var("OPSBOARD_ACCESS_KEY")
            .ok()
            .filter(|s| !s.is_empty());

        if !dev_mode && jwt_secret.is_none() {
            anyhow::bail!("JWT_SECRET must be set unless OPSBOARD_DEV_MODE=true");
        }

        Ok(Self {
            host: std::env::var("OPSBOARD_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("OPSBOARD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("OPSBOARD_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            dev_mode,
            access_key,
            jwt_secret,
            token_ttl_days: std::env::var("JWT_TTL_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(30),
        })
    }

    /// Effective JWT secret. Dev mode falls back to a fixed local secret so
    /// a bare `cargo run` works without setup.
    pub fn jwt_secret(&self) -> &str {
        self.jwt_secret.as_deref().unwrap_or("opsboard-dev-secret")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("opsboard.db")
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
