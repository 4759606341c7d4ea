use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub database: PathBuf,
    /// Provision the schema when opening the store.
    #[serde(default)]
    pub create_schema: bool,
    #[serde(default)]
    pub tables: Tables,
}

fn default_name() -> String {
    "leads".into()
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Table names. Interpolated into SQL, so only plain identifiers pass
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub entities: String,
    pub history: String,
    pub runs: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            entities: "leads".into(),
            history: "leads_history".into(),
            runs: "sync_log".into(),
        }
    }
}

impl Tables {
    pub fn validate(&self) -> Result<(), SyncError> {
        let named = [
            ("entities", &self.entities),
            ("history", &self.history),
            ("runs", &self.runs),
        ];

        for (role, name) in named {
            if !is_identifier(name) {
                return Err(SyncError::ConfigValidation(format!(
                    "tables.{role}: '{name}' is not a valid table name"
                )));
            }
        }

        for (i, (role_a, a)) in named.iter().enumerate() {
            for (role_b, b) in &named[i + 1..] {
                if a.eq_ignore_ascii_case(b) {
                    return Err(SyncError::ConfigValidation(format!(
                        "tables.{role_a} and tables.{role_b} both name '{a}'"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Config for a database path with default tables.
    pub fn for_database(path: impl Into<PathBuf>) -> Self {
        Self {
            name: default_name(),
            database: path.into(),
            create_schema: false,
            tables: Tables::default(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, SyncError> {
        let config: SyncConfig =
            toml::from_str(input).map_err(|e| SyncError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file. A relative `database` is resolved against
    /// the config file's directory.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let input = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Io(format!("cannot read {}: {e}", path.display())))?;
        let mut config = Self::from_toml(&input)?;
        if config.database.is_relative() {
            let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
            config.database = base_dir.join(&config.database);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.database.as_os_str().is_empty() {
            return Err(SyncError::ConfigValidation("database path is empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(SyncError::ConfigValidation("name is empty".into()));
        }
        self.tables.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
