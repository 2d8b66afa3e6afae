use anyhow::{Result, bail};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "electra.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl StoreConfig {
    /// Read `ELECTRA_DB_PATH`, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = match lookup("ELECTRA_DB_PATH") {
            Some(path) if path.trim().is_empty() => bail!("ELECTRA_DB_PATH is set but empty"),
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_DB_PATH),
        };

        Ok(Self { db_path })
    }
}
