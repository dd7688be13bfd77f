//! Field bound checks. Each returns the value on success so callers can chain.

use super::ConfigError;

fn invalid(section: &'static str, field: &'static str, detail: String) -> ConfigError {
    ConfigError::Invalid {
        section,
        field,
        detail,
    }
}

pub fn check_positive(section: &'static str, field: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value < 1 {
        return Err(invalid(
            section,
            field,
            format!(" ({}) must be greater than 0", value),
        ));
    }
    Ok(value)
}

pub fn check_nonempty<'a>(
    section: &'static str,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(section, field, " is empty".to_string()));
    }
    Ok(value)
}

/// RFC 1123 style hostname: dot-separated labels of 1-63 alphanumerics or `-`,
/// no label starting or ending with `-`. One trailing dot is allowed.
pub fn check_hostname<'a>(
    section: &'static str,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !is_valid_hostname(trimmed) {
        return Err(invalid(section, field, " has an invalid entry".to_string()));
    }
    Ok(value)
}

fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.len() > 255 {
        return false;
    }
    let hostname = hostname.strip_suffix('.').unwrap_or(hostname);
    hostname.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_rejects_zero() {
        let err = check_positive("lftp", "remote_port", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad config: lftp.remote_port (0) must be greater than 0"
        );
        assert_eq!(check_positive("lftp", "remote_port", 22).unwrap(), 22);
    }

    #[test]
    fn nonempty_rejects_whitespace() {
        let err = check_nonempty("controller", "extract_path", "   ").unwrap_err();
        assert_eq!(err.to_string(), "Bad config: controller.extract_path is empty");
    }

    #[test]
    fn hostnames() {
        for ok in ["localhost", "seedbox.example.com", "example.com.", "10.0.0.1", "a-b.c"] {
            assert!(check_hostname("lftp", "remote_address", ok).is_ok(), "{ok}");
        }
        for bad in ["", "-lead.example.com", "trail-.example.com", "under_score.com", "a..b"] {
            assert!(check_hostname("lftp", "remote_address", bad).is_err(), "{bad}");
        }
        let long_label = "a".repeat(64);
        assert!(check_hostname("lftp", "remote_address", &long_label).is_err());
    }
}
