use std::{env, str::FromStr};

use thiserror::Error;
use tracing::Level;

pub const DEFAULT_ATLAS_HOST: &str = "cluster0.lc40fqb.mongodb.net";
pub const DEFAULT_DATABASE: &str = "toyMarketplace";
pub const DEFAULT_COLLECTION: &str = "toys";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MongoDbInitializationInfo {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    MongoDb(MongoDbInitializationInfo),
    InMemory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: Storage,
    pub port: u16,
    pub cors_origin: String,
    pub log_path: Option<String>,
    pub log_level: Level,
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup so it can be tested without
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("STORAGE").as_deref() {
            None | Some("mongodb") => Storage::MongoDb(mongodb_from_lookup(&lookup)?),
            Some("memory") => Storage::InMemory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: String::from("STORAGE"),
                    value: String::from(other),
                })
            }
        };

        Ok(AppConfig {
            storage,
            port: parse_or("PORT", lookup("PORT"), DEFAULT_PORT)?,
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| String::from(DEFAULT_CORS_ORIGIN)),
            log_path: lookup("LOG_PATH"),
            log_level: parse_or("LOG_LEVEL", lookup("LOG_LEVEL"), Level::DEBUG)?,
        })
    }
}

fn mongodb_from_lookup<F>(lookup: &F) -> Result<MongoDbInitializationInfo, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let uri = match lookup("MONGODB_URI") {
        Some(uri) => uri,
        None => match (lookup("DB_USER"), lookup("DB_PASS")) {
            (Some(user), Some(pass)) => {
                let host =
                    lookup("MONGODB_HOST").unwrap_or_else(|| String::from(DEFAULT_ATLAS_HOST));
                format!("mongodb+srv://{}:{}@{}/?retryWrites=true&w=majority", user, pass, host)
            }
            _ => return Err(ConfigError::Missing(String::from("MONGODB_URI or DB_USER/DB_PASS"))),
        },
    };

    Ok(MongoDbInitializationInfo {
        uri,
        database: lookup("MONGODB_DB").unwrap_or_else(|| String::from(DEFAULT_DATABASE)),
        collection: lookup("MONGODB_COLLECTION")
            .unwrap_or_else(|| String::from(DEFAULT_COLLECTION)),
    })
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key: String::from(key),
            value,
        }),
        None => Ok(default),
    }
}
