use crate::config::types::{Config, JobConfig, PoolConfig, ProviderConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_job_config(&config.job)?;
    validate_pool_config(&config.pool)?;
    validate_provider_config(&config.provider)?;

    if config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the crawl job configuration
fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
    if config.keywords.is_empty() {
        return Err(ConfigError::Validation(
            "keywords cannot be empty".to_string(),
        ));
    }

    if config.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "keywords must not contain blank entries".to_string(),
        ));
    }

    if config.start_date >= config.end_date {
        return Err(ConfigError::Validation(format!(
            "start-date {} must be strictly before end-date {}",
            config.start_date, config.end_date
        )));
    }

    if config.chunk_days < 1 {
        return Err(ConfigError::Validation(format!(
            "chunk-days must be >= 1, got {}",
            config.chunk_days
        )));
    }

    if config.max_per_chunk < 1 {
        return Err(ConfigError::Validation(format!(
            "max-per-chunk must be >= 1, got {}",
            config.max_per_chunk
        )));
    }

    if config.max_workers < 1 || config.max_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "max-workers must be between 1 and 64, got {}",
            config.max_workers
        )));
    }

    Ok(())
}

/// Validates the account pool configuration
fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.accounts_path.is_empty() {
        return Err(ConfigError::Validation(
            "accounts-path cannot be empty".to_string(),
        ));
    }

    if config.ban_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "ban-threshold must be >= 1, got {}",
            config.ban_threshold
        )));
    }

    if config.cooldown_base_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "cooldown-base-secs must be >= 1, got {}",
            config.cooldown_base_secs
        )));
    }

    if config.cooldown_max_secs < config.cooldown_base_secs {
        return Err(ConfigError::Validation(format!(
            "cooldown-max-secs ({}) must be >= cooldown-base-secs ({})",
            config.cooldown_max_secs, config.cooldown_base_secs
        )));
    }

    if config.acquire_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "acquire-attempts must be >= 1, got {}",
            config.acquire_attempts
        )));
    }

    Ok(())
}

/// Validates the provider endpoint configuration
fn validate_provider_config(config: &ProviderConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must be http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page-size must be >= 1, got {}",
            config.page_size
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::OutputConfig;
    use chrono::NaiveDate;

    fn valid_config() -> Config {
        Config {
            job: JobConfig {
                keywords: vec!["rust".to_string()],
                start_date: NaiveDate::from_ymd_opt(2023, 1, 12).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2023, 3, 1).unwrap(),
                chunk_days: 7,
                max_per_chunk: 130,
                request_delay_ms: 500,
                chunk_delay_ms: 1000,
                max_workers: 4,
            },
            pool: PoolConfig {
                accounts_path: "accounts.json".to_string(),
                ban_threshold: 3,
                cooldown_base_secs: 60,
                cooldown_max_secs: 3600,
                acquire_attempts: 3,
                acquire_backoff_secs: 30,
            },
            provider: ProviderConfig {
                base_url: "https://search.example.com/api/".to_string(),
                timeout_secs: 30,
                page_size: 50,
            },
            output: OutputConfig {
                database_path: "./driftnet.db".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_keywords_rejected() {
        let mut config = valid_config();
        config.job.keywords.clear();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_blank_keyword_rejected() {
        let mut config = valid_config();
        config.job.keywords.push("   ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_reversed_date_range_rejected() {
        let mut config = valid_config();
        config.job.start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_equal_dates_rejected() {
        let mut config = valid_config();
        config.job.end_date = config.job.start_date;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_chunk_days_rejected() {
        let mut config = valid_config();
        config.job.chunk_days = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = valid_config();
        config.provider.base_url = "not a url".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_ftp_base_url_rejected() {
        let mut config = valid_config();
        config.provider.base_url = "ftp://search.example.com/".to_string();
        assert!(validate(&config).is_err());
    }
}
