//! Runs one payload through the offload pipeline and prints the result as JSON.
//!
//! ```text
//! offload-demo --kind heatmap --input features.json
//! offload-demo --kind forecast --synthetic 48 --seed 7 --log-format json
//! ```

use std::path::PathBuf;

use airmap_offload::demo::{self, InputKind};
use airmap_offload::offload::{build_offload_pipeline, OffloadConfig, OffloadService};
use airmap_offload::telemetry::{self, LogFormat};
use anyhow::Context as _;
use clap::Parser;
use tower::ServiceExt;

#[derive(Parser, Debug)]
#[command(version, about = "Offload a heatmap or forecast transform and print the result")]
struct Args {
    /// Which transform to run.
    #[arg(long, value_enum)]
    kind: InputKind,

    /// JSON file holding an array of features or forecast entries.
    #[arg(long, conflicts_with = "synthetic")]
    input: Option<PathBuf>,

    /// Generate this many synthetic records instead of reading a file.
    #[arg(long, default_value_t = 100)]
    synthetic: usize,

    /// Seed for synthetic records.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// How long a dispatch waits for the background context, in milliseconds.
    #[arg(long, env = "AIRMAP_DISPATCH_TIMEOUT_MS", default_value_t = 30_000)]
    dispatch_timeout_ms: u64,

    /// Request queue depth per background context.
    #[arg(long, env = "AIRMAP_CHANNEL_CAPACITY", default_value_t = 256)]
    channel_capacity: usize,

    /// Keep a context that faulted instead of recreating it on the next call.
    #[arg(long)]
    keep_faulted_contexts: bool,

    #[arg(long, env = "AIRMAP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Args {
    fn config(&self) -> OffloadConfig {
        OffloadConfig {
            dispatch_timeout_ms: self.dispatch_timeout_ms,
            channel_capacity: self.channel_capacity,
            release_on_fault: !self.keep_faulted_contexts,
            ..OffloadConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.log_format)?;

    let payload = match &args.input {
        Some(path) => demo::load_payload(path, args.kind)?,
        None => demo::synthetic_payload(args.kind, args.synthetic, args.seed),
    };

    let service = OffloadService::new(args.config());
    let pipeline = build_offload_pipeline(service.clone());

    let outcome = tokio::select! {
        outcome = pipeline.oneshot(payload) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, disposing background contexts");
            service.dispose();
            return Ok(());
        }
    };

    if let Some(reason) = outcome.reason() {
        tracing::info!(reason = reason.kind(), "result came from the synchronous fallback");
    }

    let json = serde_json::to_string_pretty(&outcome.into_inner())
        .context("failed to render result")?;
    println!("{json}");

    service.dispose();
    Ok(())
}
