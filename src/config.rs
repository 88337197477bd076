// src/config.rs

use crate::manager::RegistryConfig;
use crate::runner::RestartPolicy;
use crate::worker::DEFAULT_BLOCK_SIZE;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LISTEN: &str = "0.0.0.0:8081";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no file pattern given; pass --path or set `path` in the config file")]
    MissingPattern,
    #[error("invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid listen address '{0}'")]
    InvalidListen(String),
    #[error("block size must be positive")]
    InvalidBlockSize,
}

/// HTTP-controlled disk read load generator
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "diskbusy", version, about = "HTTP-controlled disk read load generator")]
pub struct CliArgs {
    /// Glob pattern of the candidate files to read (e.g. '/data/*')
    #[arg(long = "path", value_name = "GLOB")]
    pub path: Option<String>,

    /// Address the HTTP control plane listens on
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Bytes per read; also the limiter cost of one read
    #[arg(long, value_name = "BYTES")]
    pub block_size: Option<usize>,

    /// Give up on a job after this many missing-file restarts (default: never)
    #[arg(long, value_name = "N")]
    pub max_restarts: Option<u32>,

    /// Pause between missing-file restarts, in milliseconds
    #[arg(long, value_name = "MS")]
    pub restart_backoff_ms: Option<u64>,

    /// TOML file with the same settings; flags take precedence
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Optional settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub path: Option<String>,
    pub listen: Option<String>,
    pub block_size: Option<usize>,
    pub max_restarts: Option<u32>,
    pub restart_backoff_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub registry: RegistryConfig,
}

impl ServiceConfig {
    /// Merges CLI flags over the optional config file and validates the result.
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let pattern = args
            .path
            .or(file.path)
            .filter(|p| !p.trim().is_empty())
            .ok_or(ConfigError::MissingPattern)?;
        if let Err(source) = glob::Pattern::new(&pattern) {
            return Err(ConfigError::InvalidPattern { pattern, source });
        }

        let listen_str = args
            .listen
            .or(file.listen)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_str
            .parse()
            .map_err(|_| ConfigError::InvalidListen(listen_str.clone()))?;

        let block_size = args
            .block_size
            .or(file.block_size)
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        if block_size == 0 {
            return Err(ConfigError::InvalidBlockSize);
        }

        let restart = RestartPolicy {
            max_restarts: args.max_restarts.or(file.max_restarts),
            backoff: Duration::from_millis(
                args.restart_backoff_ms
                    .or(file.restart_backoff_ms)
                    .unwrap_or(0),
            ),
        };

        Ok(Self {
            listen,
            registry: RegistryConfig {
                pattern,
                block_size,
                restart,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_only_path_is_given() {
        let cfg = ServiceConfig::from_args(CliArgs::parse_from(["diskbusy", "--path", "/data/*"]))
            .unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8081".parse().unwrap());
        assert_eq!(cfg.registry.pattern, "/data/*");
        assert_eq!(cfg.registry.block_size, 64 * 1024);
        assert_eq!(cfg.registry.restart, RestartPolicy::default());
    }

    #[test]
    fn pattern_is_required() {
        let err = ServiceConfig::from_args(CliArgs::parse_from(["diskbusy"])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPattern));
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            path = "/from/file/*"
            listen = "127.0.0.1:9000"
            block_size = 4096
            max_restarts = 5
            restart_backoff_ms = 250
            "#
        )
        .unwrap();

        let args = CliArgs::parse_from([
            "diskbusy",
            "--config",
            file.path().to_str().unwrap(),
            "--listen",
            "127.0.0.1:9100",
        ]);
        let cfg = ServiceConfig::from_args(args).unwrap();
        assert_eq!(cfg.registry.pattern, "/from/file/*");
        assert_eq!(cfg.listen, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(cfg.registry.block_size, 4096);
        assert_eq!(cfg.registry.restart.max_restarts, Some(5));
        assert_eq!(cfg.registry.restart.backoff, Duration::from_millis(250));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_listen = CliArgs::parse_from(["diskbusy", "--path", "/d/*", "--listen", "nope"]);
        assert!(matches!(
            ServiceConfig::from_args(bad_listen),
            Err(ConfigError::InvalidListen(_))
        ));

        let bad_block = CliArgs::parse_from(["diskbusy", "--path", "/d/*", "--block-size", "0"]);
        assert!(matches!(
            ServiceConfig::from_args(bad_block),
            Err(ConfigError::InvalidBlockSize)
        ));
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let args = CliArgs::parse_from(["diskbusy", "--path", "/data/[*"]);
        match ServiceConfig::from_args(args) {
            Err(ConfigError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "/data/[*"),
            other => panic!("expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn unreadable_file_is_reported() {
        let args = CliArgs::parse_from(["diskbusy", "--config", "/definitely/not/here.toml"]);
        assert!(matches!(
            ServiceConfig::from_args(args),
            Err(ConfigError::Read { .. })
        ));
    }
}
