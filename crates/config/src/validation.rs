//! Configuration validation
//!
//! Rejects sizes the daemon cannot run with:
//! - zero ring capacity, line length, output buffer or ingress queue
//! - negative inherited descriptors
//! - an empty log filter

use crate::Config;
use crate::error::{ConfigError, Result};

const SECTION: &str = "memlogd";

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.log.level.trim().is_empty() {
        return Err(ConfigError::invalid_value("log", "level", "must not be empty"));
    }

    let daemon = &config.memlogd;

    for (field, value) in [
        ("max_lines", daemon.max_lines),
        ("max_line_len", daemon.max_line_len),
        ("output_buffer", daemon.output_buffer()),
        ("ingress_queue", daemon.ingress_queue),
    ] {
        if value == 0 {
            return Err(ConfigError::invalid_value(SECTION, field, "must be at least 1"));
        }
    }

    for (field, fd) in [("fd_log", daemon.fd_log), ("fd_query", daemon.fd_query)] {
        if let Some(fd) = fd
            && fd < 0
        {
            return Err(ConfigError::invalid_value(
                SECTION,
                field,
                format!("descriptor {fd} is negative"),
            ));
        }
    }

    Ok(())
}
