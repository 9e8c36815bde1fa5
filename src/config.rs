// SPDX-License-Identifier: MIT
//
// Server configuration: a line-oriented `key = value` file with `#` or
// `;` comments. Loaded from the working directory first, then the
// system path, else built-in defaults. Invalid values produce a
// diagnostic and fall back to defaults rather than stopping the server.

use std::fmt;
use std::io;
use std::path::Path;

use tracing::warn;

use crate::names::{CONFIG_PATH_LOCAL, CONFIG_PATH_SYSTEM, MAX_FILE_SIZE};

pub const DEFAULT_MAX_WORKERS: u32 = 10;
pub const DEFAULT_MIN_THREADS: u32 = 4;
pub const DEFAULT_MAX_THREADS: u32 = 8;

pub const ABSOLUTE_MAX_WORKERS: u32 = 100;
pub const ABSOLUTE_MIN_THREADS: u32 = 1;
pub const ABSOLUTE_MAX_THREADS: u32 = 32;

/// The server's tunables. `is_valid` records whether the last load
/// passed validation; an invalid record is replaced by defaults before
/// it is ever used for sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub max_workers: u32,
    pub min_threads: u32,
    pub max_threads: u32,
    pub is_valid: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            min_threads: DEFAULT_MIN_THREADS,
            max_threads: DEFAULT_MAX_THREADS,
            is_valid: true,
        }
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_workers={} min_threads={} max_threads={}",
            self.max_workers, self.min_threads, self.max_threads
        )
    }
}

impl ServerConfig {
    /// Load from the standard search path. A missing file is not an
    /// error; an invalid file logs a diagnostic and yields defaults.
    pub fn load() -> Self {
        for path in [CONFIG_PATH_LOCAL, CONFIG_PATH_SYSTEM] {
            match Self::load_from(Path::new(path)) {
                Ok(config) => {
                    tracing::info!(path, %config, "configuration loaded");
                    return config;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(path, %err, "configuration unreadable, trying next source");
                }
            }
        }
        Self::default()
    }

    /// Re-load for the reload signal. A file that exists but cannot be
    /// read is a transient failure: the previous record is kept and a
    /// warning logged. No file anywhere means defaults, as at startup.
    pub fn reload(previous: &Self) -> Self {
        for path in [CONFIG_PATH_LOCAL, CONFIG_PATH_SYSTEM] {
            match Self::load_from(Path::new(path)) {
                Ok(config) => {
                    tracing::info!(path, %config, "configuration reloaded");
                    return config;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    warn!(path, %err, "reload failed, keeping previous configuration");
                    return *previous;
                }
            }
        }
        Self::default()
    }

    /// Load one file. Unknown keys are ignored; out-of-bounds values
    /// invalidate the record, which then falls back to defaults.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse configuration text. Always returns a usable record: a
    /// failed validation is reported and replaced by the defaults.
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let Ok(value) = value.trim().parse::<u32>() else {
                warn!(key, value = value.trim(), "ignoring non-numeric config value");
                config.is_valid = false;
                continue;
            };
            match key {
                "max_workers" => config.max_workers = value,
                "min_threads" => config.min_threads = value,
                "max_threads" => config.max_threads = value,
                _ => {}
            }
        }

        if config.validate() {
            config.is_valid = true;
            config
        } else {
            warn!("invalid configuration, falling back to defaults");
            Self::default()
        }
    }

    /// Hard bounds from the service contract.
    fn validate(&self) -> bool {
        if self.max_workers < 1 || self.max_workers > ABSOLUTE_MAX_WORKERS {
            warn!(
                max_workers = self.max_workers,
                "max_workers must be between 1 and {ABSOLUTE_MAX_WORKERS}"
            );
            return false;
        }
        for (key, value) in [
            ("min_threads", self.min_threads),
            ("max_threads", self.max_threads),
        ] {
            if value < ABSOLUTE_MIN_THREADS || value > ABSOLUTE_MAX_THREADS {
                warn!(
                    key,
                    value, "thread bound must be between {ABSOLUTE_MIN_THREADS} and {ABSOLUTE_MAX_THREADS}"
                );
                return false;
            }
        }
        if self.min_threads > self.max_threads {
            warn!(
                min_threads = self.min_threads,
                max_threads = self.max_threads,
                "min_threads cannot exceed max_threads"
            );
            return false;
        }
        self.is_valid
    }

    /// Worker thread count for an input of `file_size` bytes: linear
    /// interpolation between the thread bounds over the permitted file
    /// size range, clamped to those bounds.
    pub fn thread_count(&self, file_size: u64) -> u32 {
        if !self.is_valid {
            return DEFAULT_MIN_THREADS;
        }
        let span = u64::from(self.max_threads - self.min_threads);
        let interpolated = self.min_threads as u64 + file_size * span / MAX_FILE_SIZE;
        (interpolated as u32).clamp(self.min_threads, self.max_threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_within_bounds() {
        let config = ServerConfig::default();
        assert!(config.is_valid);
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.min_threads, 4);
        assert_eq!(config.max_threads, 8);
    }

    #[test]
    fn parses_keys_comments_and_whitespace() {
        let config = ServerConfig::parse(
            "# workers\n\
             max_workers = 3\n\
             ; thread pool\n\
             \n\
             min_threads=2\n\
             max_threads =  6  \n\
             unknown_key = 99\n",
        );
        assert!(config.is_valid);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.min_threads, 2);
        assert_eq!(config.max_threads, 6);
    }

    #[test]
    fn out_of_bounds_values_fall_back_to_defaults() {
        assert_eq!(
            ServerConfig::parse("max_workers = 500\n"),
            ServerConfig::default()
        );
        assert_eq!(
            ServerConfig::parse("min_threads = 0\n"),
            ServerConfig::default()
        );
        assert_eq!(
            ServerConfig::parse("min_threads = 8\nmax_threads = 2\n"),
            ServerConfig::default()
        );
        assert_eq!(
            ServerConfig::parse("max_threads = donkey\n"),
            ServerConfig::default()
        );
    }

    #[test]
    fn load_from_reads_a_real_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "max_workers = 2").unwrap();
        f.flush().unwrap();
        let config = ServerConfig::load_from(f.path()).unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.min_threads, DEFAULT_MIN_THREADS);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = ServerConfig::load_from(Path::new("/nonexistent/bmp_server.conf")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn thread_count_interpolates_and_clamps() {
        let config = ServerConfig {
            max_workers: 10,
            min_threads: 4,
            max_threads: 8,
            is_valid: true,
        };
        assert_eq!(config.thread_count(0), 4);
        assert_eq!(config.thread_count(MAX_FILE_SIZE), 8);
        assert_eq!(config.thread_count(MAX_FILE_SIZE / 2), 6);
        // Tiny files stay at the floor.
        assert_eq!(config.thread_count(1), 4);
    }

    #[test]
    fn invalid_config_uses_the_default_floor() {
        let config = ServerConfig {
            is_valid: false,
            ..ServerConfig::default()
        };
        assert_eq!(config.thread_count(MAX_FILE_SIZE), DEFAULT_MIN_THREADS);
    }
}
