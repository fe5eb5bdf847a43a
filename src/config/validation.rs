use crate::config::types::{
    ApiConfig, Config, CrawlerConfig, CredentialsConfig, HarvesterConfig,
};
use crate::ConfigError;
use url::Url;

/// Placeholder that `followers-url` must contain
pub const IDENTITY_PLACEHOLDER: &str = "{identity}";

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_api_config(&config.api)?;
    validate_credentials_config(&config.credentials)?;
    validate_harvester_config(&config.harvester, &config.credentials)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.retry_ceiling < 1 || config.retry_ceiling > 10 {
        return Err(ConfigError::Validation(format!(
            "retry_ceiling must be between 1 and 10, got {}",
            config.retry_ceiling
        )));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "progress_interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the upstream API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    if !config.followers_url.contains(IDENTITY_PLACEHOLDER) {
        return Err(ConfigError::Validation(format!(
            "followers_url must contain the {} placeholder",
            IDENTITY_PLACEHOLDER
        )));
    }

    let sample = config.followers_url.replace(IDENTITY_PLACEHOLDER, "sample");
    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid followers_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "followers_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.uri_namespace.is_empty() {
        return Err(ConfigError::Validation(
            "uri_namespace cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates credential pool bounds
fn validate_credentials_config(config: &CredentialsConfig) -> Result<(), ConfigError> {
    if config.min_pool_size < 1 {
        return Err(ConfigError::Validation(
            "min_pool_size must be >= 1".to_string(),
        ));
    }

    if config.max_pool_size < config.min_pool_size {
        return Err(ConfigError::Validation(format!(
            "max_pool_size ({}) must be >= min_pool_size ({})",
            config.max_pool_size, config.min_pool_size
        )));
    }

    if config.max_harvest_failures == Some(0) {
        return Err(ConfigError::Validation(
            "max_harvest_failures must be >= 1 when set".to_string(),
        ));
    }

    if config.required_headers.iter().any(|h| h.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "required_headers cannot contain empty names".to_string(),
        ));
    }

    Ok(())
}

/// Validates the harvester definition
fn validate_harvester_config(
    config: &HarvesterConfig,
    credentials: &CredentialsConfig,
) -> Result<(), ConfigError> {
    match config {
        HarvesterConfig::Command {
            program,
            timeout_secs,
            ..
        } => {
            if program.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "harvester program cannot be empty".to_string(),
                ));
            }
            if *timeout_secs == 0 {
                return Err(ConfigError::Validation(
                    "harvester timeout_secs must be >= 1".to_string(),
                ));
            }
        }
        HarvesterConfig::Static { headers } => {
            if headers.is_empty() {
                return Err(ConfigError::Validation(
                    "static harvester needs at least one header set".to_string(),
                ));
            }
            for (index, set) in headers.iter().enumerate() {
                if let Some((name, _)) = set.iter().find(|(_, v)| !v.is_str()) {
                    return Err(ConfigError::Validation(format!(
                        "static header set {} has non-string header '{}'",
                        index, name
                    )));
                }
                for required in &credentials.required_headers {
                    if !set.keys().any(|k| k.eq_ignore_ascii_case(required)) {
                        return Err(ConfigError::Validation(format!(
                            "static header set {} is missing required header '{}'",
                            index, required
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}
