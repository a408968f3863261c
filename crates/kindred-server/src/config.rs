use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used outside development.
pub const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Chat only between users whose connection request was accepted.
    pub require_connection: bool,
}

impl ServerConfig {
    /// Read `KINDRED_*` variables from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let allow_dev_secret = flag(lookup("KINDRED_ALLOW_DEV_SECRET").as_deref())?;
        let jwt_secret = lookup("KINDRED_JWT_SECRET").unwrap_or_default();
        let placeholder = jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str());
        if placeholder && !allow_dev_secret {
            bail!("KINDRED_JWT_SECRET is unset or still a placeholder");
        }
        let jwt_secret = if jwt_secret.is_empty() {
            "dev-secret-change-me".to_string()
        } else {
            jwt_secret
        };

        let port: u16 = lookup("KINDRED_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("KINDRED_PORT must be a port number")?;
        let token_ttl_days: i64 = lookup("KINDRED_TOKEN_TTL_DAYS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("KINDRED_TOKEN_TTL_DAYS must be a whole number of days")?;
        if token_ttl_days <= 0 {
            bail!("KINDRED_TOKEN_TTL_DAYS must be positive");
        }

        Ok(Self {
            host: lookup("KINDRED_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: lookup("KINDRED_DB_PATH")
                .unwrap_or_else(|| "kindred.db".into())
                .into(),
            jwt_secret,
            token_ttl_days,
            require_connection: flag(lookup("KINDRED_REQUIRE_CONNECTION").as_deref())?,
        })
    }
}

fn flag(value: Option<&str>) -> anyhow::Result<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => bail!("expected a boolean flag, got '{}'", other),
    }
}
