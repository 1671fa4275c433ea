//! Settings for the `sqlite_books` demo, read from a TOML file.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Database file, or `:memory:`.
    pub database: String,
    /// `env_logger` filter; `RUST_LOG` wins when set.
    pub log_filter: String,
    /// Drop and recreate the `Book` table before inserting.
    pub recreate_table: bool,
    pub books: Vec<Book>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            database: ":memory:".to_string(),
            log_filter: "info".to_string(),
            recreate_table: true,
            books: vec![
                Book { id: 1, title: "A".to_string() },
                Book { id: 2, title: "B".to_string() },
                Book { id: 3, title: "C".to_string() },
            ],
        }
    }
}

impl DemoConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`, or falls back to the defaults when there is no file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for book in &self.books {
            if book.title.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("book {} has an empty title", book.id)));
            }
            if book.title.chars().count() > 100 {
                return Err(ConfigError::Invalid(format!(
                    "book {} title is longer than 100 characters",
                    book.id
                )));
            }
            if !seen.insert(book.id) {
                return Err(ConfigError::Invalid(format!("duplicate book id {}", book.id)));
            }
        }
        Ok(())
    }
}
