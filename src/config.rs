use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Service configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub public_url: String,
    pub client_secret_path: String,
    pub firebase: Option<FirebaseAdmin>,
    pub bootstrap_admin_uid: Option<String>,
    pub ban_sweep_interval: Duration,
    pub session_inactivity: time::Duration,
}

#[derive(Debug, Clone)]
pub struct FirebaseAdmin {
    pub project_id: String,
    pub access_token: String,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let _ = dotenv::dotenv();

        let firebase = match (dotenv::var("FIREBASE_PROJECT_ID"), dotenv::var("FIREBASE_ACCESS_TOKEN")) {
            (Ok(project_id), Ok(access_token)) => Some(FirebaseAdmin { project_id, access_token }),
            _ => None,
        };

        Ok(Config {
            database_url: dotenv::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            bind_addr: dotenv::var("BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            public_url: dotenv::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_owned()),
            client_secret_path: dotenv::var("CLIENT_SECRET_PATH")
                .unwrap_or_else(|_| "client_secret.json".to_owned()),
            firebase,
            bootstrap_admin_uid: dotenv::var("BOOTSTRAP_ADMIN_UID").ok(),
            ban_sweep_interval: sweep_interval(
                &dotenv::var("BAN_SWEEP_INTERVAL_SECS").unwrap_or_else(|_| "300".to_owned()),
            )?,
            session_inactivity: time::Duration::minutes(
                dotenv::var("SESSION_INACTIVITY_MINUTES")
                    .unwrap_or_else(|_| "60".to_owned())
                    .parse()
                    .context("SESSION_INACTIVITY_MINUTES must be a number of minutes")?,
            ),
        })
    }
}

fn sweep_interval(secs: &str) -> Result<Duration> {
    let secs: u64 = secs
        .trim()
        .parse()
        .context("BAN_SWEEP_INTERVAL_SECS must be a number of seconds")?;
    if secs == 0 {
        bail!("BAN_SWEEP_INTERVAL_SECS must be at least 1");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_interval_must_be_positive() {
        assert_eq!(sweep_interval("300").unwrap(), Duration::from_secs(300));
        assert!(sweep_interval("0").is_err());
        assert!(sweep_interval("soon").is_err());
    }
}
