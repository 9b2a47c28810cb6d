//! Configuration management for the server.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Upper bound on pooled database connections
    pub max_connections: u32,
    /// When set, every request must carry a bearer token
    pub auth_secret: Option<String>,
    /// Maximum comment length in characters
    pub max_content_len: usize,
    /// Reserved words from `RESERVED_WORDS` (comma separated), merged with
    /// the `reserved_words` table
    pub reserved_words: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidMaxConnections(raw))?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let max_content_len = match env::var("MAX_CONTENT_LEN") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidMaxContentLen(raw))?,
            Err(_) => DEFAULT_MAX_CONTENT_LEN,
        };

        let reserved_words = env::var("RESERVED_WORDS")
            .map(|raw| parse_word_list(&raw))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            auth_secret,
            max_content_len,
            reserved_words,
        })
    }

    /// Configuration for tests that never touch the environment.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "postgres://localhost/threadline_test".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            auth_secret: None,
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
            reserved_words: Vec::new(),
        }
    }
}

pub const DEFAULT_MAX_CONTENT_LEN: usize = 500;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

fn parse_word_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid DATABASE_MAX_CONNECTIONS value: {0}")]
    InvalidMaxConnections(String),

    #[error("Invalid MAX_CONTENT_LEN value: {0}")]
    InvalidMaxContentLen(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_list_skips_blanks() {
        assert_eq!(parse_word_list(" spam, ,scam,"), vec!["spam", "scam"]);
        assert!(parse_word_list("").is_empty());
    }
}
