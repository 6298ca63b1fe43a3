//! Input validation for configuration documents
//!
//! Every field of an inbound configuration update passes through one of these
//! checks before it is merged. A failing check rejects only that field:
//! - Out-of-range numbers keep the previous value
//! - Unbounded strings are refused before they reach the pipeline
//! - Shell and pipeline-description metacharacters never reach the backend

use anyhow::{anyhow, Result};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for a destination host name (RFC 1035)
pub const MAX_HOST_LENGTH: usize = 253;

/// Maximum length for a capture device path or camera identifier
pub const MAX_DEVICE_LENGTH: usize = 4096;

/// Maximum length for an encoder element name
pub const MAX_ENCODER_LENGTH: usize = 64;

/// Characters that would let a value escape its property slot in a
/// pipeline description or a shell command line.
const DANGEROUS_CHARS: [char; 9] = ['`', '$', ';', '|', '&', '!', '\n', '\r', '"'];

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Reject values carrying pipeline or shell metacharacters
pub fn validate_no_metacharacters(value: &str, field_name: &str) -> Result<()> {
    if value.chars().any(|c| DANGEROUS_CHARS.contains(&c)) {
        return Err(anyhow!("{} contains forbidden characters", field_name));
    }
    Ok(())
}

/// Validate a UDP destination host (name or address literal)
pub fn validate_host(host: &str) -> Result<()> {
    validate_non_empty(host, "host")?;
    validate_length(host, MAX_HOST_LENGTH, "host")?;
    if host.chars().any(char::is_whitespace) {
        return Err(anyhow!("host cannot contain whitespace"));
    }
    validate_no_metacharacters(host, "host")
}

/// Validate a capture device path or camera identifier. Empty means auto-detect.
pub fn validate_device(device: &str) -> Result<()> {
    validate_length(device, MAX_DEVICE_LENGTH, "device")?;
    validate_no_metacharacters(device, "device")
}

/// Validate an encoder name against the supported set
pub fn validate_encoder(encoder: &str, supported: &[&str]) -> Result<()> {
    validate_non_empty(encoder, "encoder")?;
    validate_length(encoder, MAX_ENCODER_LENGTH, "encoder")?;
    if !supported.contains(&encoder) {
        return Err(anyhow!(
            "encoder '{}' is not supported (expected one of: {})",
            encoder,
            supported.join(", ")
        ));
    }
    Ok(())
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate port number (1-65535) and narrow it
pub fn validate_port(port: i64) -> Result<u16> {
    validate_range(port, 1, 65535, "port")?;
    u16::try_from(port).map_err(|_| anyhow!("port must be between 1 and 65535, got {}", port))
}

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

/// Validate a bounded integer dimension and narrow it to `u32`
pub fn validate_dimension(value: i64, min: u32, max: u32, field_name: &str) -> Result<u32> {
    validate_range(value, i64::from(min), i64::from(max), field_name)?;
    u32::try_from(value).map_err(|_| anyhow!("{} out of range", field_name))
}

/// Validate a finite float within range
pub fn validate_finite_range(value: f64, min: f64, max: f64, field_name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(anyhow!("{} must be a finite number", field_name));
    }
    validate_range(value, min, max, field_name)
}

// ============================================================================
// Tests
// ============================================================================
