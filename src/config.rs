use std::{net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Context};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub avatar_dir: PathBuf,
    pub session_inactivity_minutes: i64,
    pub cookie_secure: bool,
    pub allowed_origin: Option<String>,
    pub bootstrap_admin_email: Option<String>,
}

impl Config {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        let optional = |key: &str| lookup(key).map(|x| x.trim().to_owned()).filter(|x| !x.is_empty());

        let bind_addr = var("BIND_ADDR", "0.0.0.0:8080");
        let session_inactivity_minutes = var("SESSION_INACTIVITY_MINUTES", "60");
        let cookie_secure = var("COOKIE_SECURE", "false");

        Ok(Config {
            database_url: var("DATABASE_URL", "sqlite://mentorhub.db?mode=rwc"),
            bind_addr: bind_addr
                .parse()
                .with_context(|| format!("BIND_ADDR {bind_addr:?} is not a socket address"))?,
            avatar_dir: PathBuf::from(var("AVATAR_DIR", "avatars")),
            session_inactivity_minutes: match session_inactivity_minutes.parse() {
                Ok(x) if x > 0 => x,
                _ => return Err(anyhow!("SESSION_INACTIVITY_MINUTES {session_inactivity_minutes:?} must be a positive number")),
            },
            cookie_secure: cookie_secure
                .parse()
                .with_context(|| format!("COOKIE_SECURE {cookie_secure:?} must be true or false"))?,
            allowed_origin: optional("ALLOWED_ORIGIN"),
            bootstrap_admin_email: optional("BOOTSTRAP_ADMIN_EMAIL").map(|x| x.to_lowercase()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.session_inactivity_minutes, 60);
        assert!(!config.cookie_secure);
        assert!(config.allowed_origin.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("COOKIE_SECURE", "true"),
            ("BOOTSTRAP_ADMIN_EMAIL", " Admin@Example.com "),
            ("ALLOWED_ORIGIN", ""),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.cookie_secure);
        assert_eq!(config.bootstrap_admin_email.as_deref(), Some("admin@example.com"));
        assert!(config.allowed_origin.is_none());
    }

    #[test]
    fn bad_values_fail() {
        assert!(Config::from_lookup(lookup(&[("BIND_ADDR", "nowhere")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SESSION_INACTIVITY_MINUTES", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("COOKIE_SECURE", "yes")])).is_err());
    }
}
