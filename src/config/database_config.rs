use crate::config::resolve_path;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite file, created on first start.
    pub path: String,
}

impl DatabaseConfig {
    pub fn parse_path(&self) -> anyhow::Result<PathBuf> {
        resolve_path(&self.path)
    }
}
