use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SraError;
use crate::srr::{DEFAULT_DEFLINE_SEQ, DEFAULT_MAX_SIZE};

pub const DEFAULT_CONFIG_FILE: &str = "kira-sra.json";
/// `0` keeps dispatching until every output exists.
pub const DEFAULT_MAX_ROUNDS: u32 = 0;
pub const DEFAULT_BACKOFF_SECS: u64 = 0;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub gzip: Option<bool>,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub defline_seq: Option<String>,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub retry: Option<RetryEntry>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ToolPaths {
    #[serde(default)]
    pub prefetch: Option<PathBuf>,
    #[serde(default)]
    pub fastq_dump: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetryEntry {
    #[serde(default)]
    pub max_rounds: Option<u32>,
    #[serde(default)]
    pub backoff_secs: Option<u64>,
}

/// How many dispatch rounds the driver may run and how long it waits
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until every output exists.
    pub max_rounds: Option<u32>,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_rounds: None,
            backoff: Duration::ZERO,
        }
    }

    /// `0` means no cap.
    pub fn from_rounds(max_rounds: u32, backoff: Duration) -> Self {
        Self {
            max_rounds: (max_rounds > 0).then_some(max_rounds),
            backoff,
        }
    }

    pub fn allows(&self, rounds_done: u32) -> bool {
        self.max_rounds.is_none_or(|max| rounds_done < max)
    }

    /// Linear backoff; nothing before the first round.
    pub fn delay_before(&self, rounds_done: u32) -> Duration {
        self.backoff.saturating_mul(rounds_done)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub workers: usize,
    pub max_size: u64,
    pub defline_seq: String,
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            max_size: DEFAULT_MAX_SIZE,
            defline_seq: DEFAULT_DEFLINE_SEQ.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub gzip: bool,
    pub settings: FetchSettings,
    pub tools: ToolPaths,
}

/// Command-line values that win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workers: Option<usize>,
    pub gzip: Option<bool>,
    pub max_rounds: Option<u32>,
    pub backoff_secs: Option<u64>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `kira-sra.json` in the working directory when it
    /// exists, or falls back to defaults.
    pub fn resolve(
        path: Option<&str>,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, SraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| SraError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| SraError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: &ConfigOverrides,
    ) -> Result<ResolvedConfig, SraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let defaults = FetchSettings::default();

        let workers = overrides
            .workers
            .or(config.workers)
            .unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(SraError::InvalidWorkers);
        }

        let (file_rounds, file_backoff) = match &config.retry {
            Some(retry) => (retry.max_rounds, retry.backoff_secs),
            None => (None, None),
        };
        let max_rounds = overrides
            .max_rounds
            .or(file_rounds)
            .unwrap_or(DEFAULT_MAX_ROUNDS);
        let backoff_secs = overrides
            .backoff_secs
            .or(file_backoff)
            .unwrap_or(DEFAULT_BACKOFF_SECS);

        Ok(ResolvedConfig {
            schema_version,
            gzip: overrides.gzip.or(config.gzip).unwrap_or(false),
            settings: FetchSettings {
                workers,
                max_size: config.max_size.unwrap_or(defaults.max_size),
                defline_seq: config.defline_seq.unwrap_or(defaults.defline_seq),
                retry: RetryPolicy::from_rounds(max_rounds, Duration::from_secs(backoff_secs)),
            },
            tools: config.tools,
        })
    }
}
