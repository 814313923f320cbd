//! Configuration module for compass.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::collections::HashSet;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;
use crate::gateway::Procedure;

/// Local backend / dev server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key every client must present (open when unset)
    pub api_key: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Procedures this deployment has not installed
    pub disabled_procedures: HashSet<Procedure>,
    /// bcrypt work factor for stored passwords
    pub bcrypt_cost: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let api_key = lookup("COMPASS_API_KEY").filter(|k| !k.is_empty());

        let db_path = lookup("COMPASS_DB_PATH")
            .unwrap_or_else(|| "./data/compass.sqlite".to_string())
            .into();

        let bind_addr = lookup("COMPASS_BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8787".to_string())
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid COMPASS_BIND_ADDR: {}", e)))?;

        let log_level = lookup("COMPASS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let disabled_procedures = match lookup("COMPASS_DISABLED_PROCEDURES") {
            Some(list) => parse_procedure_list(&list)?,
            None => HashSet::new(),
        };

        let bcrypt_cost = match lookup("COMPASS_BCRYPT_COST") {
            Some(cost) => cost
                .parse()
                .map_err(|e| AppError::Validation(format!("Invalid COMPASS_BCRYPT_COST: {}", e)))?,
            None => bcrypt::DEFAULT_COST,
        };

        Ok(Self {
            api_key,
            db_path,
            bind_addr,
            log_level,
            disabled_procedures,
            bcrypt_cost,
        })
    }
}

/// Settings for the HTTP transport of the gateway.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend, without a trailing slash
    pub url: String,
    /// Public API key sent as the `apikey` header
    pub api_key: Option<String>,
}

impl ClientConfig {
    /// Load client configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let raw = lookup("COMPASS_URL").unwrap_or_else(|| "http://127.0.0.1:8787".to_string());
        url::Url::parse(&raw)
            .map_err(|e| AppError::Validation(format!("Invalid COMPASS_URL: {}", e)))?;

        Ok(Self {
            url: raw.trim_end_matches('/').to_string(),
            api_key: lookup("COMPASS_API_KEY").filter(|k| !k.is_empty()),
        })
    }
}

fn parse_procedure_list(list: &str) -> Result<HashSet<Procedure>, AppError> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            Procedure::from_name(name).ok_or_else(|| {
                AppError::Validation(format!("Unknown procedure in COMPASS_DISABLED_PROCEDURES: {}", name))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_lookup(|_| None).unwrap();

        assert!(config.api_key.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/compass.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8787");
        assert_eq!(config.log_level, "info");
        assert!(config.disabled_procedures.is_empty());
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("COMPASS_API_KEY", "anon"),
            ("COMPASS_BIND_ADDR", "0.0.0.0:9000"),
            ("COMPASS_DISABLED_PROCEDURES", "invite_team_member"),
            ("COMPASS_BCRYPT_COST", "4"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("anon"));
        assert_eq!(config.bind_addr.port(), 9000);
        assert!(config.disabled_procedures.contains(&Procedure::InviteTeamMember));
        assert_eq!(config.bcrypt_cost, 4);

        let empty_key = Config::from_lookup(lookup_from(&[("COMPASS_API_KEY", "")])).unwrap();
        assert!(empty_key.api_key.is_none());

        assert!(Config::from_lookup(lookup_from(&[("COMPASS_BCRYPT_COST", "lots")])).is_err());
    }

    #[test]
    fn test_client_config() {
        let client =
            ClientConfig::from_lookup(lookup_from(&[("COMPASS_URL", "https://api.example.com/")]))
                .unwrap();
        assert_eq!(client.url, "https://api.example.com");
        assert!(client.api_key.is_none());

        assert!(ClientConfig::from_lookup(lookup_from(&[("COMPASS_URL", "not a url")])).is_err());
    }

    #[test]
    fn test_procedure_list_parsing() {
        let set = parse_procedure_list("get_user_events, create_event,,").unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Procedure::GetUserEvents));
        assert!(set.contains(&Procedure::CreateEvent));

        assert!(parse_procedure_list("drop_everything").is_err());
    }
}
