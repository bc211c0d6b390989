#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use crate::catalog::model::script_source;
use crate::catalog::{Command, CommandStatus, CommandStore};
use crate::config::{self, Config, Layout};
use crate::gateway::{self, AppState, Secret};
use crate::lock::InstanceLock;
use crate::logging;
use crate::output::table::{command_table, format_duration_ms};
use crate::scheduler::Scheduler;

#[derive(Debug, Parser)]
#[command(
    name = "recmd",
    version,
    about = "Register shell commands and run them through a sequential scheduler"
)]
pub struct Cli {
    /// Path to config.toml
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP daemon
    Serve(ServeArgs),
    /// Register a command
    Add(AddArgs),
    /// List registered commands
    #[command(alias = "ls")]
    List(ListArgs),
    /// Search commands by description (case-insensitive)
    Search(SearchArgs),
    /// Print what a command runs
    Show(HashArgs),
    /// Delete the first command whose hash starts with HASH
    #[command(alias = "rm")]
    Delete(HashArgs),
    /// Run a command in the foreground and record its duration
    Run(RunArgs),
    /// Print the daemon's current secret
    Secret,
    Config(ConfigArgs),
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Listen address (overrides server.listen)
    #[arg(short = 'l', long = "listen")]
    pub listen: Option<String>,
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Command text
    pub command: String,
    /// Description used by search
    #[arg(short = 'd', long = "description", default_value = "")]
    pub description: String,
    /// Directory the command runs from
    #[arg(short = 'w', long = "workdir", default_value = ".")]
    pub working_directory: String,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    pub description: String,
    /// Output in JSON format
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct HashArgs {
    /// Hash or hash prefix
    pub hash: String,
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Hash or hash prefix
    pub hash: String,
    /// Print the full result as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    /// Print the resolved configuration
    List,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cfg = config::load(cli.config.as_deref())?;
    let layout = cfg.layout()?;

    if !matches!(cli.cmd, Commands::Serve(_)) {
        logging::init_stderr_logging("warn");
    }

    match cli.cmd {
        Commands::Serve(args) => cmd_serve(&cfg, &layout, args).await,
        Commands::Add(args) => cmd_add(&layout, &args),
        Commands::List(args) => cmd_list(&layout, &args),
        Commands::Search(args) => cmd_search(&layout, &args),
        Commands::Show(args) => cmd_show(&layout, &args),
        Commands::Delete(args) => cmd_delete(&layout, &args),
        Commands::Run(args) => cmd_run(&cfg, &layout, &args).await,
        Commands::Secret => {
            let secret = Secret::load(&layout.secret_file())?;
            println!("{}", secret.expose());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config(args) => match args.cmd {
            ConfigCmd::List => {
                print!("{}", config::list_resolved_toml(&cfg)?);
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

async fn cmd_serve(cfg: &Config, layout: &Layout, args: ServeArgs) -> anyhow::Result<ExitCode> {
    layout.ensure_dirs()?;
    let _instance = InstanceLock::acquire(&layout.lock_file())?;
    let _log_guard = logging::init_file_logging(layout, &cfg.log.level)?;
    tracing::info!(conf_dir = %layout.conf_dir.display(), "initializing");

    let secret = Secret::rotate(&layout.secret_file())?;
    let store = CommandStore::open(layout.history_file())?;
    let state = AppState::start(store, cfg.scheduler.to_scheduler_config(), secret);

    let addr = args.listen.unwrap_or_else(|| cfg.server.listen.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    println!("recmd listening on {addr}");
    println!("secret file: {}", layout.secret_file().display());
    println!("log file: {}", layout.log_file().display());

    gateway::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down server");
    })
    .await
    .context("server failed")?;

    Ok(ExitCode::SUCCESS)
}

fn open_store(layout: &Layout) -> anyhow::Result<CommandStore> {
    layout.ensure_dirs()?;
    Ok(CommandStore::open(layout.history_file())?)
}

/// Catalog writes and command runs outside the daemon. Fails while the daemon
/// (or another local writer) holds the instance lock.
fn lock_local(layout: &Layout) -> anyhow::Result<InstanceLock> {
    layout.ensure_dirs()?;
    Ok(InstanceLock::acquire(&layout.lock_file())?)
}

fn cmd_add(layout: &Layout, args: &AddArgs) -> anyhow::Result<ExitCode> {
    if args.command.trim().is_empty() {
        anyhow::bail!("command text must not be empty");
    }
    let expanded = config::expand_path(&args.working_directory)?;
    if !expanded.is_dir() {
        anyhow::bail!("invalid working directory: {}", expanded.display());
    }
    let working_directory = std::fs::canonicalize(&expanded)
        .with_context(|| format!("failed to resolve {}", expanded.display()))?;

    let _instance = lock_local(layout)?;
    let store = open_store(layout)?;
    let cmd = Command::new(
        &args.command,
        &args.description,
        &working_directory.to_string_lossy(),
    );
    let hash = cmd.hash.clone();
    store.insert(cmd)?;
    println!("Command added successfully (hash: {hash})");
    Ok(ExitCode::SUCCESS)
}

fn cmd_list(layout: &Layout, args: &ListArgs) -> anyhow::Result<ExitCode> {
    let cmds = open_store(layout)?.list()?;
    print_commands(&cmds, args.json)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_search(layout: &Layout, args: &SearchArgs) -> anyhow::Result<ExitCode> {
    let cmds = open_store(layout)?.search_by_description(&args.description)?;
    print_commands(&cmds, args.json)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(layout: &Layout, args: &HashArgs) -> anyhow::Result<ExitCode> {
    let cmd = find_command(&open_store(layout)?, &args.hash)?;
    println!("{}", script_source(&cmd));
    Ok(ExitCode::SUCCESS)
}

fn cmd_delete(layout: &Layout, args: &HashArgs) -> anyhow::Result<ExitCode> {
    let _instance = lock_local(layout)?;
    let removed = open_store(layout)?.delete_by_hash_prefix(&args.hash)?;
    let Some(cmd) = removed.first() else {
        anyhow::bail!("no command found matching hash: {}", args.hash);
    };
    println!("Deleted {} ({})", cmd.hash, cmd.command_text);
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(cfg: &Config, layout: &Layout, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let _instance = lock_local(layout)?;
    let store = Arc::new(open_store(layout)?);
    let cmd = find_command(&store, &args.hash)?;

    let scheduler = Scheduler::start_with_hook(
        cfg.scheduler.to_scheduler_config(),
        gateway::duration_hook(Arc::clone(&store)),
    );
    let (_job_id, finished) = scheduler.run(cmd).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&finished)?);
    } else {
        print!("{}", finished.coutput);
        eprintln!(
            "{} in {} (exit status {})",
            finished.command.status.as_str(),
            format_duration_ms(finished.command.duration),
            finished.exit_status
        );
    }

    Ok(if finished.command.status == CommandStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn find_command(store: &CommandStore, hash: &str) -> anyhow::Result<Command> {
    if hash.trim().is_empty() {
        anyhow::bail!("hash must not be empty");
    }
    store
        .select_by_hash_prefix(hash)?
        .with_context(|| format!("no command found matching hash: {hash}"))
}

fn print_commands(cmds: &[Command], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(cmds)?);
        return Ok(());
    }
    let table = command_table(cmds);
    if table.is_empty() {
        println!("No commands found");
        return Ok(());
    }
    table.print()?;
    Ok(())
}
