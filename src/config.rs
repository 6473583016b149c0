//! Session configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::BufferPolicy;

/// Session configuration, loadable from TOML. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Scheduler period in milliseconds.
    pub tick_interval_ms: u64,
    /// Pause between producer cycles in milliseconds. The scheduler pops one
    /// snapshot per model per tick, so a bounded buffer only stays bounded
    /// without evictions while this is at least `tick_interval_ms`.
    pub step_interval_ms: u64,
    /// Per-(aspect, model) buffer bound; `None` leaves buffers unbounded.
    pub buffer_capacity: Option<usize>,
    /// Simulation description file (`.toml` or `.json`).
    pub description_path: Option<PathBuf>,
    /// Address the WebSocket transport binds.
    pub listen_addr: String,
    /// Outgoing frames queued per connection before sends fail.
    pub writer_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            step_interval_ms: 100,
            buffer_capacity: Some(1024),
            description_path: None,
            listen_addr: "127.0.0.1:8099".to_string(),
            writer_queue_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if the document is not valid.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Loads a TOML config file.
    ///
    /// A relative `description_path` is resolved against the config file's
    /// directory.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let (Some(description), Some(dir)) = (config.description_path.as_ref(), path.parent()) {
            if description.is_relative() {
                config.description_path = Some(dir.join(description));
            }
        }
        Ok(config)
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    /// True when the producer pushes faster than the scheduler pops into a
    /// bounded buffer, so the buffer fills up and starts evicting.
    #[must_use]
    pub const fn producer_outpaces_scheduler(&self) -> bool {
        self.buffer_capacity.is_some() && self.step_interval_ms < self.tick_interval_ms
    }

    #[must_use]
    pub const fn buffer_policy(&self) -> BufferPolicy {
        match self.buffer_capacity {
            Some(capacity) => BufferPolicy::DropOldest { capacity },
            None => BufferPolicy::Unbounded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.buffer_policy(), BufferPolicy::DropOldest { capacity: 1024 });
        assert_eq!(config.listen_addr, "127.0.0.1:8099");
        assert!(config.step_interval() >= config.tick_interval());
        assert!(!config.producer_outpaces_scheduler());
    }

    #[test]
    fn fast_producer_into_bounded_buffer_outpaces() {
        let config = SessionConfig {
            tick_interval_ms: 100,
            step_interval_ms: 10,
            ..SessionConfig::default()
        };
        assert!(config.producer_outpaces_scheduler());

        let unbounded = SessionConfig {
            buffer_capacity: None,
            ..config
        };
        assert!(!unbounded.producer_outpaces_scheduler());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SessionConfig::from_toml_str("tick_interval_ms = 250\n").unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.step_interval_ms, 100);
        assert_eq!(config.writer_queue_capacity, 256);
    }

    #[test]
    fn load_resolves_relative_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "description_path = \"scene.toml\"\nstep_interval_ms = 0\n").unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.description_path, Some(dir.path().join("scene.toml")));
        assert_eq!(config.step_interval(), Duration::ZERO);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = SessionConfig::from_toml_str("tick_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SessionConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
