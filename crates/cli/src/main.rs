//! `rusty-automation-tool` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`       — start the API server.
//! - `worker`      — start a queue worker driving the execution engine.
//! - `migrate`     — run pending database migrations.
//! - `validate`    — validate a workflow JSON file.
//! - `session-key` — Session-Key Authority CRUD and the monitor sweep.

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use config::Config;

#[derive(Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "High-performance workflow automation engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Start a background worker that drains `job_queue` and drives
    /// workflows to completion, alongside the session monitor sweep.
    Worker,
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
    /// Session-Key Authority operations.
    SessionKey {
        #[command(subcommand)]
        action: SessionKeyCommand,
    },
}

#[derive(Subcommand)]
enum SessionKeyCommand {
    /// Delegate a new session key.
    Create {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        chain_id: i64,
        #[arg(long)]
        owner_address: String,
        #[arg(long)]
        parent_address: String,
        #[arg(long, default_value = "standard")]
        security_level: String,
        #[arg(long, default_value_t = 24)]
        valid_hours: i64,
        /// Path to a JSON file: `[{"operation","maxAmountPerTx","maxDailyAmount","allowedContracts","requireConfirmation","emergencyStop"}]`.
        #[arg(long)]
        permissions_json: std::path::PathBuf,
        /// Secret used to encrypt the generated private key at rest.
        #[arg(long)]
        user_signature: String,
        #[arg(long)]
        purpose: Option<String>,
    },
    /// Fetch a session key by id.
    Get {
        id: Uuid,
    },
    /// List session keys owned by a user.
    List {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        status: Option<String>,
    },
    /// Validate a would-be use without performing it.
    Validate {
        id: Uuid,
        #[arg(long)]
        operation: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        to_address: String,
    },
    /// Revoke a session key.
    Revoke {
        id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Expire every active session key past `validUntil`.
    Cleanup,
    /// Run one session-monitor sweep pass immediately.
    Sweep,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionDto {
    operation: String,
    max_amount_per_tx: Decimal,
    max_daily_amount: Decimal,
    #[serde(default)]
    allowed_contracts: Vec<String>,
    #[serde(default)]
    require_confirmation: bool,
    #[serde(default)]
    emergency_stop: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or(config.bind.clone());
            info!("Starting API server on {bind}");
            let pool = db::pool::create_pool(&config.database_url, config.max_pool_connections)
                .await
                .expect("failed to connect to database");
            api::serve(&bind, pool).await.unwrap();
        }
        Command::Worker => run_worker(&config).await,
        Command::Migrate { database_url } => {
            info!("Running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2).await.expect("failed to connect to database");
            db::pool::run_migrations(&pool).await.expect("migration failed");
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));

            let workflow: engine::Workflow = serde_json::from_str(&content)
                .unwrap_or_else(|e| panic!("invalid JSON: {e}"));

            match engine::validate_dag(&workflow) {
                Ok(order) => {
                    println!("Workflow is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::SessionKey { action } => run_session_key_command(&config, action).await,
    }
}

/// Start a queue worker and the session monitor sweep side by side;
/// both are cancelled together on Ctrl-C.
async fn run_worker(config: &Config) {
    info!("Starting background worker");

    let pool = db::pool::create_pool(&config.database_url, config.max_pool_connections)
        .await
        .expect("failed to connect to database");

    let authority = Arc::new(session::SessionKeyAuthority::new(pool.clone()));

    let services = nodes::services::Services {
        http: Some(reqwest::Client::new()),
        session_authority: Some(authority.clone() as Arc<dyn nodes::services::SessionAuthority>),
        replay_store: Some(Arc::new(nodes::replay::DbReplayStore::new(pool.clone())) as Arc<dyn nodes::replay::ReplayStore>),
        ..Default::default()
    };

    let executor_config = engine::ExecutorConfig {
        max_parallel_nodes: config.max_parallel_nodes,
        ..Default::default()
    };

    let executor = Arc::new(engine::WorkflowExecutor::new(
        pool.clone(),
        nodes::default_registry(),
        services,
        executor_config,
    ));

    let shutdown = CancellationToken::new();
    let worker = queue::Worker::new(pool.clone(), executor, queue::WorkerConfig::default());

    let monitor = session::SessionMonitor::new(
        pool.clone(),
        session::MonitorConfig { sweep_interval: Duration::from_secs(config.session_sweep_interval_secs) },
    );

    let worker_shutdown = shutdown.clone();
    let monitor_shutdown = shutdown.clone();

    let worker_task = tokio::spawn(worker.run(worker_shutdown));
    let monitor_task = tokio::spawn(monitor.run(monitor_shutdown));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
    }
    info!("shutdown signal received");
    shutdown.cancel();

    let _ = tokio::join!(worker_task, monitor_task);
}

async fn run_session_key_command(config: &Config, action: SessionKeyCommand) {
    let pool = db::pool::create_pool(&config.database_url, 4).await.expect("failed to connect to database");
    let authority = session::SessionKeyAuthority::new(pool.clone());

    match action {
        SessionKeyCommand::Create {
            user_id,
            chain_id,
            owner_address,
            parent_address,
            security_level,
            valid_hours,
            permissions_json,
            user_signature,
            purpose,
        } => {
            let content = std::fs::read_to_string(&permissions_json)
                .unwrap_or_else(|e| panic!("cannot read {}: {e}", permissions_json.display()));
            let dtos: Vec<PermissionDto> =
                serde_json::from_str(&content).unwrap_or_else(|e| panic!("invalid permissions JSON: {e}"));

            let permissions = dtos
                .into_iter()
                .map(|p| session::PermissionRequest {
                    operation: p.operation,
                    max_amount_per_tx: p.max_amount_per_tx,
                    max_daily_amount: p.max_daily_amount,
                    allowed_contracts: p.allowed_contracts,
                    require_confirmation: p.require_confirmation,
                    emergency_stop: p.emergency_stop,
                })
                .collect();

            let request = session::CreateSessionKeyRequest {
                user_id,
                chain_id,
                owner_address,
                parent_address,
                security_level,
                valid_until: chrono::Utc::now() + chrono::Duration::hours(valid_hours),
                permissions,
                purpose,
            };

            match authority.create(request, &user_signature).await {
                Ok(created) => {
                    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                        "sessionKeyId": created.session_key_id,
                        "sessionAddress": created.session_address,
                        "delegationMessage": created.delegation_message,
                    })).unwrap());
                }
                Err(e) => {
                    eprintln!("failed to create session key: {e}");
                    std::process::exit(1);
                }
            }
        }
        SessionKeyCommand::Get { id } => match authority.get(id).await {
            Ok(row) => println!("{}", serde_json::to_string_pretty(&row).unwrap()),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        SessionKeyCommand::List { user_id, status } => {
            match authority.list_by_user(&user_id, status.as_deref()).await {
                Ok(rows) => println!("{}", serde_json::to_string_pretty(&rows).unwrap()),
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
        SessionKeyCommand::Validate { id, operation, amount, to_address } => {
            match authority.validate(id, &operation, amount, &to_address).await {
                Ok(outcome) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "isValid": outcome.is_valid,
                            "errors": outcome.errors,
                            "remainingDailyAmount": outcome.remaining_daily_amount,
                        }))
                        .unwrap()
                    );
                    if !outcome.is_valid {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
        SessionKeyCommand::Revoke { id, reason } => match authority.revoke(id, reason.as_deref()).await {
            Ok(()) => println!("revoked {id}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        SessionKeyCommand::Cleanup => match authority.cleanup_expired().await {
            Ok(count) => println!("expired {count} session key(s)"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        SessionKeyCommand::Sweep => {
            let monitor = session::SessionMonitor::new(pool, session::MonitorConfig::default());
            let report = monitor.sweep_once().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "expired": report.expired,
                    "paused": report.paused,
                    "reactivated": report.reactivated,
                    "dailyResets": report.daily_resets,
                    "alerts": report.alerts.len(),
                }))
                .unwrap()
            );
        }
    }
}
