use crate::accounts::Credentials;
use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use driftnet::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Keywords: {:?}", config.job.keywords);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored on each run row so that resumed runs can be matched
/// against the configuration that produced them.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Loads account credentials from a JSON file
///
/// The file is an array of objects with `username`, `password`, `email` and
/// `email_pass` fields.
pub fn load_accounts(path: &Path) -> Result<Vec<Credentials>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let accounts: Vec<Credentials> = serde_json::from_str(&content)?;
    if accounts.is_empty() {
        return Err(ConfigError::Validation(format!(
            "accounts file {} contains no accounts",
            path.display()
        )));
    }
    Ok(accounts)
}
