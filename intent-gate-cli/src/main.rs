// intent-gate-cli/src/main.rs
// ============================================================================
// Module: Intent Gate CLI Entry Point
// Description: Command dispatcher for serving and offline maintenance.
// Purpose: Provide a safe operator CLI for the governance pipeline.
// Dependencies: clap, intent-gate-{config,core,server}, tokio, tracing
// ============================================================================

//! ## Overview
//! The CLI loads validated configuration, initializes tracing, and runs one
//! of: the HTTP server with its workers and scheduler, an offline audit
//! chain verification, or an immediate retention cleanup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use intent_gate_config::IntentGateConfig;
use intent_gate_core::TenantId;
use tracing::error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "intent-gate", version, about = "Multi-tenant intent governance pipeline")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short = 'c', default_value = "intent-gate.toml")]
    config: PathBuf,
    /// Command to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server with workers and the scheduler.
    Serve,
    /// Verify a tenant's audit chain and print the report.
    VerifyChain {
        /// Tenant whose chain to verify.
        #[arg(long)]
        tenant: String,
        /// First sequence to verify.
        #[arg(long)]
        start_sequence: Option<u64>,
        /// Maximum links to verify.
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Run retention cleanup immediately and exit.
    Cleanup,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Process entry point.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let config = match IntentGateConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %cli.config.display(), error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };
    match cli.command {
        Command::Serve => runtime.block_on(run_serve(config)),
        Command::VerifyChain {
            tenant,
            start_sequence,
            limit,
        } => runtime.block_on(run_verify(config, tenant, start_sequence, limit)),
        Command::Cleanup => runtime.block_on(run_cleanup(config)),
    }
}

/// Runs the server until shutdown.
async fn run_serve(config: IntentGateConfig) -> ExitCode {
    match intent_gate_server::serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "server exited with error");
            ExitCode::FAILURE
        }
    }
}

/// Verifies one tenant's audit chain offline.
async fn run_verify(
    config: IntentGateConfig,
    tenant: String,
    start_sequence: Option<u64>,
    limit: Option<u64>,
) -> ExitCode {
    let system = match intent_gate_server::build_system(&config) {
        Ok(system) => system,
        Err(err) => {
            error!(error = %err, "failed to build system");
            return ExitCode::FAILURE;
        }
    };
    let report = match system.state.audit.verify_chain_integrity(
        &TenantId::new(tenant),
        start_sequence,
        limit,
    ) {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "verification failed to run");
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string_pretty(&report) {
        Ok(rendered) => tracing::info!(report = %rendered, "chain verification finished"),
        Err(err) => error!(error = %err, "failed to render report"),
    }
    for task in system.tasks {
        task.abort();
    }
    if report.valid { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Runs retention cleanup once.
async fn run_cleanup(config: IntentGateConfig) -> ExitCode {
    let system = match intent_gate_server::build_system(&config) {
        Ok(system) => system,
        Err(err) => {
            error!(error = %err, "failed to build system");
            return ExitCode::FAILURE;
        }
    };
    system.state.scheduler.run_cleanup(system.state.clock_now());
    for task in system.tasks {
        task.abort();
    }
    ExitCode::SUCCESS
}
