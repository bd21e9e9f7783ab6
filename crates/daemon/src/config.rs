//! Daemon configuration from environment variables

use anyhow::{anyhow, Context, Result};
use conveyor_core::domain::QueueName;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.conveyor/queue.db";
const DEFAULT_RPC_PORT: u16 = 9630;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_BARRIER_INTERVAL_MS: u64 = 1000;
const DEFAULT_CLEAN_BATCH_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Production: JSON structured logging
    Json,
    /// Development: pretty formatting with colors
    Pretty,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub rpc_port: u16,
    pub poll_interval: Duration,
    pub barrier_interval: Duration,
    pub clean_batch_limit: u32,
    /// Per-queue concurrency applied after the workers start
    pub concurrency: Vec<(QueueName, usize)>,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("CONVEYOR_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let log_format = match lookup("CONVEYOR_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let concurrency = match lookup("CONVEYOR_CONCURRENCY") {
            Some(overrides) => parse_concurrency(&overrides)?,
            None => Vec::new(),
        };

        Ok(Self {
            db_path: PathBuf::from(shellexpand::tilde(&db_path).into_owned()),
            rpc_port: parse_or(&lookup, "CONVEYOR_RPC_PORT", DEFAULT_RPC_PORT)?,
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "CONVEYOR_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            barrier_interval: Duration::from_millis(parse_or(
                &lookup,
                "CONVEYOR_BARRIER_INTERVAL_MS",
                DEFAULT_BARRIER_INTERVAL_MS,
            )?),
            clean_batch_limit: parse_or(
                &lookup,
                "CONVEYOR_CLEAN_BATCH_LIMIT",
                DEFAULT_CLEAN_BATCH_LIMIT,
            )?,
            concurrency,
            log_format,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}

/// Parse `queue=n,queue=n`
fn parse_concurrency(overrides: &str) -> Result<Vec<(QueueName, usize)>> {
    overrides.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (queue, n) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected queue=n in CONVEYOR_CONCURRENCY, got {}", entry))?;
            let queue: QueueName = queue
                .trim()
                .parse()
                .with_context(|| format!("Unknown queue in CONVEYOR_CONCURRENCY: {}", queue))?;
            let n: usize = n
                .trim()
                .parse()
                .with_context(|| format!("Invalid concurrency for {}: {}", queue, n))?;
            Ok((queue, n))
        })
        .collect()
}
