//! `tracepiped`: a standalone demo of the per-input trace sub-pipeline.
//!
//! Stands up a handful of named host inputs, drives synthetic chunks
//! through their stage hooks (`on_input` / `on_filter` / `on_pre_output`),
//! and exposes `tracepipe::control`'s HTTP routes so a caller can create,
//! limit, inspect and destroy a trace context on any of them while chunks
//! are flowing — exercising the deferred-destroy protocol the same way an
//! operator toggling tracing through a real control plane would.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio::signal;

use tracepipe::control::{all_routes, AppState};
use tracepipe::engine::{Chunk, FilterIdentity, PackedRecords, PluginIdentity, Record};
use tracepipe::trace::{on_filter, on_input, on_pre_output, EnvelopeKind};
use tracepipe::Config;

#[derive(Parser, Debug)]
#[command(name = "tracepiped")]
#[command(about = "Per-input trace sub-pipeline demo daemon")]
struct Args {
    /// Path to config file
    #[arg(long, value_name = "PATH", default_value = "/etc/tracepipe/tracepipe.toml")]
    config: PathBuf,
    /// Address the HTTP control surface listens on.
    #[arg(long, default_value = "127.0.0.1:3030")]
    listen: String,
    /// Host input names to manufacture synthetic chunks for.
    #[arg(long, value_delimiter = ',', default_value = "demo-input")]
    demo_inputs: Vec<String>,
    /// Disable the background synthetic-chunk generators.
    #[arg(long)]
    no_demo_traffic: bool,
}

/// One of this demo's synthetic host inputs, identified by name with an
/// optional alias (spec §4.4: an alias adds the 7th `plugin_alias` field).
struct HostInput {
    name: String,
    alias: Option<String>,
}

impl PluginIdentity for HostInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

/// Manufactures a chunk of two records and drives it through all three
/// stage hooks in the host engine's pipeline order (spec §5: INPUT before
/// FILTER before PRE_OUTPUT for a single chunk).
async fn drive_one_chunk(state: &Arc<AppState>, host_input: &HostInput, seq: u64) {
    let mut packed = PackedRecords::new();
    packed.push(&Record {
        timestamp: seq as f64,
        value: rmpv::Value::Map(vec![(rmpv::Value::from("seq"), rmpv::Value::from(seq as i64))]),
    });
    packed.push(&Record {
        timestamp: seq as f64 + 0.5,
        value: rmpv::Value::Map(vec![(rmpv::Value::from("seq"), rmpv::Value::from(seq as i64))]),
    });
    let chunk = Chunk::new(host_input.name(), "app", packed);

    let mut slot = None;
    on_input(&state.registry, host_input, &chunk, &mut slot, &state.metrics);
    if slot.is_some() {
        state.metrics.record_envelope(EnvelopeKind::Input);
    }

    let filter = FilterIdentity::new("grep", None);
    if on_filter(&filter, &slot, seq as f64, seq as f64 + 1.0, &chunk.data, &state.metrics) {
        state.metrics.record_envelope(EnvelopeKind::Filter);
    }

    if on_pre_output(&chunk, &mut slot, &state.metrics) {
        state.metrics.record_envelope(EnvelopeKind::PreOutput);
    }
}

async fn run_demo_traffic(state: Arc<AppState>, host_input: HostInput) {
    let mut seq: u64 = 0;
    loop {
        drive_one_chunk(&state, &host_input, seq).await;
        seq += 1;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = if args.config.exists() {
        let contents = std::fs::read_to_string(&args.config)?;
        toml::from_str(&contents).unwrap_or_default()
    } else {
        Config::load()
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    info!("tracepiped starting, enable_trace={}", config.enable_trace);

    let state = Arc::new(AppState::new(config, Vec::new()));
    let demo_seq = AtomicU64::new(0);

    if !args.no_demo_traffic {
        for name in &args.demo_inputs {
            let demo_state = state.clone();
            let suffix = demo_seq.fetch_add(1, Ordering::Relaxed);
            let host_input = HostInput {
                name: name.clone(),
                alias: if suffix == 0 { None } else { Some(format!("{name}-a")) },
            };
            tokio::spawn(run_demo_traffic(demo_state, host_input));
        }
    }

    let app = all_routes(state.clone());
    let listener = TcpListener::bind(args.listen.as_str()).await?;
    info!("tracepiped HTTP control surface on http://{}", args.listen);
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            log::warn!("control surface server error: {err}");
        }
    });

    signal::ctrl_c().await?;
    info!("tracepiped shutting down");
    server.abort();
    for name in &args.demo_inputs {
        state.registry.request_destroy(name);
    }
    Ok(())
}
