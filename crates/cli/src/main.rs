//! Conveyor CLI - Command-line interface for the Conveyor control plane

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use conveyor_core::domain::{JobCounts, QueueName};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";
/// Extra time granted to the HTTP call beyond the server-side wait deadline
const WAIT_GRACE_MS: u64 = 5_000;

#[derive(Parser)]
#[command(name = "conveyorctl")]
#[command(about = "Conveyor job orchestration CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CONVEYOR_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show live queue state (all queues when none is given)
    Status {
        queue: Option<String>,
    },

    /// Show job counts per state (all queues when none is given)
    Counts {
        queue: Option<String>,
    },

    /// Stop a queue from handing out jobs
    Pause { queue: String },

    /// Let a paused queue hand out jobs again
    Resume { queue: String },

    /// Discard waiting jobs
    Drain { queue: String },

    /// Purge finished jobs
    Clean {
        queue: String,

        /// Terminal bucket: completed or failed
        #[arg(short, long, default_value = "completed")]
        bucket: String,
    },

    /// Change how many jobs a queue runs at once
    Concurrency { queue: String, concurrency: usize },

    /// Block until the queues have no active jobs
    Wait {
        /// Queues to watch (all when omitted)
        queues: Vec<String>,

        /// Give up after this many milliseconds
        #[arg(short, long, default_value = "60000")]
        timeout_ms: u64,
    },

    /// Enqueue a job
    Enqueue {
        /// Job name (e.g., AssetGenerateThumbnails)
        name: String,

        /// Payload as JSON string
        #[arg(short, long, default_value = "{}")]
        data: String,
    },

    /// Remove a job by id
    Remove {
        /// Job name, used to locate its queue
        name: String,

        /// Job ID
        job_id: String,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct StatusResult {
    queue: String,
    is_active: bool,
    is_paused: bool,
    concurrency: Option<usize>,
}

#[derive(Tabled)]
struct StatusRow {
    queue: String,
    active: String,
    paused: String,
    concurrency: String,
}

impl From<StatusResult> for StatusRow {
    fn from(status: StatusResult) -> Self {
        Self {
            queue: status.queue,
            active: yes_no(status.is_active),
            paused: yes_no(status.is_paused),
            concurrency: status
                .concurrency
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Deserialize)]
struct CountsResult {
    queue: String,
    counts: JobCounts,
}

#[derive(Tabled)]
struct CountsRow {
    queue: String,
    waiting: u64,
    delayed: u64,
    active: u64,
    completed: u64,
    failed: u64,
    paused: u64,
}

impl From<CountsResult> for CountsRow {
    fn from(result: CountsResult) -> Self {
        let counts = result.counts;
        Self {
            queue: result.queue,
            waiting: counts.waiting,
            delayed: counts.delayed,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
            paused: counts.paused,
        }
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

/// Queues named on the command line, or every queue
fn target_queues(queue: Option<String>) -> Vec<String> {
    match queue {
        Some(queue) => vec![queue],
        None => QueueName::ALL.iter().map(|q| q.to_string()).collect(),
    }
}

async fn call_rpc(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let url = cli.rpc_url.as_str();

    match cli.command {
        Commands::Status { queue } => {
            let mut rows = Vec::new();
            for queue in target_queues(queue) {
                let result =
                    call_rpc(&client, url, "queue.status.v1", json!({ "queue": queue })).await?;
                let status: StatusResult = serde_json::from_value(result)?;
                rows.push(StatusRow::from(status));
            }

            println!("{}", "Queue Status".cyan().bold());
            println!("{}", Table::new(rows));
        }

        Commands::Counts { queue } => {
            let mut rows = Vec::new();
            for queue in target_queues(queue) {
                let result =
                    call_rpc(&client, url, "queue.counts.v1", json!({ "queue": queue })).await?;
                let counts: CountsResult = serde_json::from_value(result)?;
                rows.push(CountsRow::from(counts));
            }

            println!("{}", "Job Counts".cyan().bold());
            println!("{}", Table::new(rows));
        }

        Commands::Pause { queue } => {
            call_rpc(&client, url, "queue.pause.v1", json!({ "queue": queue })).await?;
            println!("{}", format!("✓ Queue {} paused", queue).green().bold());
        }

        Commands::Resume { queue } => {
            call_rpc(&client, url, "queue.resume.v1", json!({ "queue": queue })).await?;
            println!("{}", format!("✓ Queue {} resumed", queue).green().bold());
        }

        Commands::Drain { queue } => {
            let result =
                call_rpc(&client, url, "queue.drain.v1", json!({ "queue": queue })).await?;
            println!(
                "{}",
                format!("✓ Drained {} waiting jobs from {}", result["removed"], queue)
                    .green()
                    .bold()
            );
        }

        Commands::Clean { queue, bucket } => {
            let params = json!({ "queue": queue, "bucket": bucket });
            let result = call_rpc(&client, url, "queue.clean.v1", params).await?;
            let removed = result["removed"].as_array().map_or(0, |ids| ids.len());
            println!(
                "{}",
                format!("✓ Removed {} {} jobs from {}", removed, bucket, queue)
                    .green()
                    .bold()
            );
        }

        Commands::Concurrency { queue, concurrency } => {
            let params = json!({ "queue": queue, "concurrency": concurrency });
            call_rpc(&client, url, "queue.concurrency.v1", params).await?;
            println!(
                "{}",
                format!("✓ Queue {} concurrency set to {}", queue, concurrency)
                    .green()
                    .bold()
            );
        }

        Commands::Wait { queues, timeout_ms } => {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(timeout_ms + WAIT_GRACE_MS))
                .build()?;
            let params = json!({ "queues": queues, "timeout_ms": timeout_ms });

            println!("{}", "Waiting for queues to go idle...".cyan());
            match call_rpc(&client, url, "queue.wait.v1", params).await {
                Ok(result) => println!(
                    "{}",
                    format!("✓ Queues idle after {} ms", result["waited_ms"])
                        .green()
                        .bold()
                ),
                Err(e) => {
                    println!("  {} {}", "✗".red(), e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Enqueue { name, data } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).context("Invalid JSON payload")?;
            let params = json!({ "jobs": [{ "name": name, "data": data }] });

            call_rpc(&client, url, "jobs.enqueue.v1", params).await?;
            println!("{}", format!("✓ {} enqueued", name).green().bold());
        }

        Commands::Remove { name, job_id } => {
            let params = json!({ "name": name, "job_id": job_id });
            let result = call_rpc(&client, url, "jobs.remove.v1", params).await?;

            if result["removed"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Job {} removed", job_id).green().bold());
            } else {
                println!("{}", format!("○ Job {} not found", job_id).yellow());
            }
        }
    }

    Ok(())
}
