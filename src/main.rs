//! Process entry point and lifecycle (Component I, §4.10, §4.11).
//!
//! Startup order is fixed: logging, then configuration, then the cache
//! store, then the backend client, then the sync engine, then the protocol
//! loop. This is the only module allowed to call `std::process::exit`.

use clap::Parser;
use notecache_bridge::config::Config;
use notecache_bridge::error::Result;
use notecache_bridge::protocol::{jsonrpc, DispatchOutcome, Server};
use notecache_bridge::{cache, client, logging, protocol, sync, tools, NOTES_BUCKET};
use std::sync::Arc;
use sync::SyncEngine;

#[derive(Parser, Debug)]
#[command(name = "notecache-bridge", about = "Local JSON-RPC bridge for a synced note cache")]
struct Cli {
    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Override the computed cache file path (used by integration tests).
    #[arg(long)]
    db_path: Option<std::path::PathBuf>,

    /// Run a single sync cycle then exit, instead of serving the protocol loop.
    #[arg(long)]
    once: bool,

    /// Validate configuration and exit 0/1 without starting the server.
    #[arg(long)]
    config_check: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    };

    if let Some(level) = &cli.log_level {
        match level.parse() {
            Ok(parsed) => config.log_level = parsed,
            Err(_) => {
                eprintln!("fatal: invalid --log-level value: {level}");
                std::process::exit(1);
            }
        }
    }

    if cli.config_check {
        println!("configuration OK");
        std::process::exit(0);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("fatal: failed to start tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(run(config, cli));
    std::process::exit(exit_code);
}

async fn run(config: Config, cli: Cli) -> i32 {
    let _logging_guard = logging::init(&config);
    tracing::info!("notecache-bridge starting");

    let owner_hash = cache::owner_identity_hash(&config.username);

    let (cache_handle, open_outcome) = match spawn_cache(&config, &owner_hash, cli.db_path.as_deref()) {
        Ok(v) => v,
        Err(err) => {
            tracing::error!(error = %err, "failed to open cache store");
            return 1;
        }
    };
    tracing::info!(reset = open_outcome.full_resync_required(), "cache store opened");

    let client = match client::BackendClient::new(&config) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "failed to construct backend client");
            return 1;
        }
    };

    let sync_engine = Arc::new(SyncEngine::new(
        Arc::clone(&client),
        cache_handle.clone(),
        NOTES_BUCKET.to_string(),
        config.sync_interval,
        open_outcome.full_resync_required(),
    ));

    if cli.once {
        return match sync_engine.run_once().await {
            Ok(outcome) => {
                tracing::info!(entries_applied = outcome.entries_applied, "single sync cycle complete");
                0
            }
            Err(err) => {
                tracing::error!(error = %err, "single sync cycle failed");
                1
            }
        };
    }

    let sync_handle = Arc::clone(&sync_engine).spawn();
    let cancel_token = sync_engine.cancellation_token();

    let tools: Vec<Box<dyn protocol::ToolHandler>> = vec![
        Box::new(tools::ListNotesTool::new(cache_handle.clone())),
        Box::new(tools::GetNoteTool::new(cache_handle.clone())),
        Box::new(tools::SaveNoteTool::new(
            cache_handle.clone(),
            Arc::clone(&client),
            NOTES_BUCKET.to_string(),
        )),
        Box::new(tools::ManageNotesTool::new(
            cache_handle.clone(),
            Arc::clone(&client),
            Arc::clone(&sync_engine),
            NOTES_BUCKET.to_string(),
            &config,
            &owner_hash,
        )),
    ];
    let server = Server::new(tools);

    let exit_code = serve_stdio(server, cancel_token.clone()).await;

    cancel_token.cancel();
    let _ = sync_handle.await;
    tracing::info!("notecache-bridge shut down");
    exit_code
}

fn spawn_cache(
    config: &Config,
    owner_hash: &str,
    db_path_override: Option<&std::path::Path>,
) -> Result<(cache::CacheHandle, cache::OpenOutcome)> {
    match db_path_override {
        None => cache::CacheHandle::spawn(config, owner_hash),
        Some(path) => cache::CacheHandle::spawn_at(path, owner_hash, config),
    }
}

async fn serve_stdio(server: Server, cancel: tokio_util::sync::CancellationToken) -> i32 {
    let mut transport = protocol::StdioTransport::new();
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(error = %err, "failed to install SIGTERM handler");
            return 1;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                return 0;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                return 0;
            }
            line = transport.read_line() => {
                match line {
                    Ok(None) => {
                        tracing::info!("stdin closed, shutting down");
                        return 0;
                    }
                    Ok(Some(line)) => {
                        if !handle_line(&server, &mut transport, &line).await {
                            return 0;
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "stdin read error");
                        return 1;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::warn!("sync engine stopped permanently, shutting down");
                return 1;
            }
        }
    }
}

async fn handle_line(server: &Server, transport: &mut protocol::StdioTransport, line: &str) -> bool {
    let inbound = match jsonrpc::parse_line(line) {
        Ok(inbound) => inbound,
        Err(err) => {
            let response = jsonrpc::JsonRpcResponse::failure(jsonrpc::RequestId::Number(0), err);
            let _ = transport.write_response(&response).await;
            return true;
        }
    };

    match server.dispatch(inbound).await {
        DispatchOutcome::Respond(response) => {
            if let Err(err) = transport.write_response(&response).await {
                tracing::error!(error = %err, "failed to write response");
                return false;
            }
            true
        }
        DispatchOutcome::NoResponse => true,
        DispatchOutcome::Exit => false,
    }
}
