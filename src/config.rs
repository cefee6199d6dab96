//! Process configuration from the environment (and `.env` in dev).

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Redis connection URL for the entity store.
    pub redis_url: String,
    /// Credential carrying the administrative role. `None` disables the
    /// whole monitoring surface (every admin request is rejected).
    pub admin_token: Option<String>,
    /// Cadence of the broadcast cycle. A tunable, not a correctness
    /// property.
    pub broadcast_interval: Duration,
    /// Budget for each collaborator call during snapshot assembly.
    pub collaborator_timeout: Duration,
    /// Seed demo entities on startup so a fresh process has data.
    pub seed_demo_data: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: parse_var("LEDGERSCOPE_BIND", "0.0.0.0:3000")?,
            redis_url: env::var("LEDGERSCOPE_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/".into()),
            admin_token: env::var("LEDGERSCOPE_ADMIN_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            broadcast_interval: Duration::from_millis(parse_var(
                "LEDGERSCOPE_BROADCAST_INTERVAL_MS",
                "2000",
            )?),
            collaborator_timeout: Duration::from_millis(parse_var(
                "LEDGERSCOPE_COLLABORATOR_TIMEOUT_MS",
                "250",
            )?),
            seed_demo_data: parse_var("LEDGERSCOPE_SEED_DEMO_DATA", "true")?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_owned());
    raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw })
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_vars_fall_back_to_defaults() {
        let addr: SocketAddr =
            parse_var("LEDGERSCOPE_TEST_UNSET_BIND", "0.0.0.0:3000").expect("default");
        assert_eq!(addr.port(), 3000);

        let millis: u64 = parse_var("LEDGERSCOPE_TEST_UNSET_MS", "2000").expect("default");
        assert_eq!(millis, 2000);

        let flag: bool = parse_var("LEDGERSCOPE_TEST_UNSET_FLAG", "true").expect("default");
        assert!(flag);
    }
}
