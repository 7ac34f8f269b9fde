use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::{Taxonomy, TaxonomyError};

pub const DEFAULT_WEB_PORT: u16 = 8000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is missing; set it in the environment or .env file")]
    Missing(&'static str),
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Trimmed value of `var`, with blank values treated as unset.
pub fn optional(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

/// Parses `var` when set. A value that does not parse is an error, never the default.
pub fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match optional(lookup, var) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Settings shared by every entry point: database, taxonomy override and API port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub taxonomy_path: Option<PathBuf>,
    pub web_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: optional(lookup, "DATABASE_URL"),
            taxonomy_path: optional(lookup, "SKILLTREND_TAXONOMY_PATH").map(PathBuf::from),
            web_port: parse_or(lookup, "SKILLTREND_WEB_PORT", DEFAULT_WEB_PORT)?,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    /// The override file when one is configured, otherwise the builtin taxonomy.
    pub fn load_taxonomy(&self) -> Result<Taxonomy, TaxonomyError> {
        match &self.taxonomy_path {
            Some(path) => Taxonomy::from_path(path),
            None => Ok(Taxonomy::builtin()),
        }
    }
}
