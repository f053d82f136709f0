use super::models::Config;
use crate::transform::Dimensions;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    MustBePositive { field: &'static str },

    #[error("Transform target must be at least 1x1, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Transform limit {limit} must be positive and within {ceiling}")]
    InvalidLimit { limit: Dimensions, ceiling: Dimensions },

    #[error("Default transform target {target} exceeds the {limit} limit")]
    DefaultExceedsLimit { target: Dimensions, limit: Dimensions },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_pool(config)?;
    validate_hub(config)?;
    validate_storage(config)?;
    validate_transform(config)?;
    Ok(())
}

fn positive(field: &'static str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        return Err(ValidationError::MustBePositive { field });
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    positive("server.max_upload_bytes", config.server.max_upload_bytes.as_u64())
}

fn validate_pool(config: &Config) -> Result<(), ValidationError> {
    positive("pool.pool_size", config.pool.pool_size as u64)?;
    positive("pool.queue_capacity", config.pool.queue_capacity as u64)
}

fn validate_hub(config: &Config) -> Result<(), ValidationError> {
    positive("hub.queue_depth", config.hub.queue_depth as u64)?;
    positive("hub.write_timeout_secs", config.hub.write_timeout_secs)
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    positive("storage.ttl_seconds", config.storage.ttl_seconds)?;
    positive("storage.sweep_interval_secs", config.storage.sweep_interval_secs)
}

fn validate_transform(config: &Config) -> Result<(), ValidationError> {
    let (width, height) = (config.transform.width, config.transform.height);
    if width == 0 || height == 0 {
        return Err(ValidationError::InvalidDimensions { width, height });
    }

    let limit = Dimensions::new(config.transform.max_width, config.transform.max_height);
    if limit.width == 0 || limit.height == 0 || !limit.fits_within(Dimensions::MAX) {
        return Err(ValidationError::InvalidLimit {
            limit,
            ceiling: Dimensions::MAX,
        });
    }

    let target = Dimensions::new(width, height);
    if !target.fits_within(limit) {
        return Err(ValidationError::DefaultExceedsLimit { target, limit });
    }
    Ok(())
}
