//! serverdeck CLI
//!
//! Live consoles for managed game servers: stream output, run commands,
//! pick launch scripts and register recurring restarts.

mod cmd_batch;
mod cmd_console;
mod cmd_exec;
mod cmd_log;
mod cmd_schedule;
mod logging;
mod paths;
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::info;

use serverdeck_console::{
    ConsoleApi, ConsoleConfig, ConsoleMessage, HttpConsoleApi, KvStore, OsTarget, ServerConsole,
    SqliteStore,
};

use crate::paths::DataDir;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
    name = "serverdeck",
    about = "Live game-server consoles and restart scheduling",
    version
)]
struct Cli {
    /// Directory for the database, config and logs
    #[arg(long, global = true, value_name = "DIR", env = "SERVERDECK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Panel API base URL (command execution)
    #[arg(long, global = true, value_name = "URL", env = "SERVERDECK_API_URL")]
    api_url: Option<String>,

    /// Console stream base URL (ws:// or wss://)
    #[arg(long, global = true, value_name = "URL", env = "SERVERDECK_WS_URL")]
    ws_url: Option<String>,

    /// Scheduling service base URL
    #[arg(long, global = true, value_name = "URL", env = "SERVERDECK_SCHEDULER_URL")]
    scheduler_url: Option<String>,

    /// OS of the managed servers: windows or unix
    #[arg(long = "os", global = true, value_name = "OS", env = "SERVERDECK_OS_TARGET")]
    os_target: Option<OsTarget>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive console for a server (defaults to the last one used)
    Console {
        #[arg(value_name = "SERVER_ID")]
        server_id: Option<String>,
    },
    /// Run one command and wait for its response
    Exec {
        #[arg(value_name = "SERVER_ID")]
        server_id: String,
        #[arg(value_name = "COMMAND", required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Manage the launch script and favorites
    Batch {
        #[arg(value_name = "SERVER_ID")]
        server_id: String,
        #[command(subcommand)]
        action: cmd_batch::BatchAction,
    },
    /// Register a recurring restart
    Schedule(cmd_schedule::ScheduleArgs),
    /// Print or clear the persisted console log
    Log(cmd_log::LogArgs),
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

type Console = ServerConsole<HttpConsoleApi>;

#[tokio::main]
async fn main() {
    // A pending stdin read keeps the runtime alive until the next newline
    let code = match run().await {
        Ok(()) => 0,
        Err(err) => {
            render::error(&err);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "serverdeck", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    data_dir
        .ensure_dirs()
        .with_context(|| format!("creating {}", data_dir.root().display()))?;
    let logging = logging::init_logging(&data_dir.log_dir())?;

    let config = resolve_config(&cli, &data_dir)?;
    info!(
        component = "cli",
        event = "cli.start",
        version = VERSION,
        run_id = %logging.run_id,
        data_dir = %data_dir.root().display(),
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        scheduler_url = %config.scheduler_url,
    );

    let store: Arc<dyn KvStore> = Arc::new(
        SqliteStore::open(&data_dir.db_path())
            .with_context(|| format!("opening {}", data_dir.db_path().display()))?,
    );
    let api = HttpConsoleApi::new(&config)?;
    let mut console = Console::new(config, store, api);

    match cli.command {
        Command::Console { server_id } => cmd_console::run(&mut console, server_id).await,
        Command::Exec { server_id, command } => {
            cmd_exec::run(&mut console, &server_id, &command.join(" ")).await
        }
        Command::Batch { server_id, action } => cmd_batch::run(&mut console, &server_id, action),
        Command::Schedule(args) => cmd_schedule::run(&mut console, args).await,
        Command::Log(args) => cmd_log::run(&mut console, args),
        Command::Completions { .. } => Ok(()),
    }
}

/// Flag/env > config file > defaults
fn resolve_config(cli: &Cli, data_dir: &DataDir) -> anyhow::Result<ConsoleConfig> {
    let mut config = ConsoleConfig::load(&data_dir.config_path())?;
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(url) = &cli.ws_url {
        config.ws_url = url.clone();
    }
    if let Some(url) = &cli.scheduler_url {
        config.scheduler_url = url.clone();
    }
    if let Some(os) = cli.os_target {
        config.os_target = os;
    }
    config.validate()?;
    Ok(config)
}

/// Wait for every outstanding request, printing lines as they arrive
pub async fn settle<A: ConsoleApi>(
    console: &mut ServerConsole<A>,
    timeout: Duration,
) -> anyhow::Result<Vec<ConsoleMessage>> {
    let mut seen = console.take_unseen();
    render::print_messages(&seen);
    tokio::time::timeout(timeout, async {
        while console.pending_requests() > 0 {
            let lines = console.pump().await;
            render::print_messages(&lines);
            seen.extend(lines);
        }
    })
    .await
    .context("timed out waiting for a response")?;
    Ok(seen)
}

/// Request timeout plus a little slack for the event round trip
pub fn response_timeout(config: &ConsoleConfig) -> Duration {
    Duration::from_secs(config.request_timeout_secs + 2)
}
