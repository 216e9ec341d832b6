use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dxi::index::loader::{open_table, IndexLoader};
use dxi::index::stats;
use dxi::index::Section;
use dxi::output;
use dxi::query::{QueryEngine, SearchHit, SearchOptions};
use dxi::utils::progress::load_spinner;
use dxi::utils::{resolve_index_dirs, AppConfig};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use termcolor::StandardStream;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dxi", version)]
#[command(about = "Search generated documentation symbol indexes from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Search query (when no subcommand is given; opens the TUI when empty)
    query: Vec<String>,

    #[command(flatten)]
    index: IndexArgs,

    #[command(flatten)]
    search: SearchArgs,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args, Debug, Clone, Default)]
struct IndexArgs {
    /// Search directory holding shard files (repeatable; later ones win per shard name)
    #[arg(short, long = "index", value_name = "DIR")]
    index: Vec<PathBuf>,

    /// Parse shards only when a query needs them
    #[arg(long)]
    lazy: bool,
}

#[derive(Args, Debug, Clone)]
struct SearchArgs {
    /// Only symbols of this kind (classes, functions, variables, ...)
    #[arg(short, long, value_name = "SECTION")]
    kind: Option<Section>,

    /// Only symbols whose scope contains this text
    #[arg(short, long)]
    scope: Option<String>,

    /// Maximum number of results (0 for unlimited)
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Resolve anchors to file:// URLs
    #[arg(long)]
    resolve: bool,

    /// When to use colors
    #[arg(long, value_name = "WHEN", default_value = "auto", value_parser = ["auto", "always", "never"])]
    color: String,

    /// Do not use a running daemon
    #[arg(long)]
    no_daemon: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and print ranked results
    Search {
        /// Search query
        #[arg(required = true)]
        query: Vec<String>,

        #[command(flatten)]
        index: IndexArgs,

        #[command(flatten)]
        search: SearchArgs,
    },
    /// Interactive incremental search
    Tui {
        /// Initial query
        query: Option<String>,

        #[command(flatten)]
        index: IndexArgs,
    },
    /// Show index statistics
    Stats {
        #[command(flatten)]
        index: IndexArgs,
    },
    /// Validate every shard and report malformed ones
    Check {
        #[command(flatten)]
        index: IndexArgs,
    },
    /// Manage the index server daemon (keeps shard sets warm)
    #[cfg(all(unix, feature = "daemon"))]
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[cfg(all(unix, feature = "daemon"))]
#[derive(Subcommand)]
enum DaemonAction {
    /// Start the daemon in background
    Start,
    /// Stop the running daemon
    Stop,
    /// Check daemon status
    Status,
    /// Run daemon in foreground (for debugging)
    Foreground,
    /// Reload the index for a set of search directories
    Reload {
        #[command(flatten)]
        index: IndexArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dxi: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dxi=warn")),
        1 => EnvFilter::new("dxi=info"),
        2 => EnvFilter::new("dxi=debug"),
        _ => EnvFilter::new("dxi=trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load()?;

    match cli.command {
        Some(Commands::Search { query, index, search }) => {
            run_search(&query.join(" "), &index, &search, &config)
        }
        Some(Commands::Tui { query, index }) => run_tui(query, &index, &config),
        Some(Commands::Stats { index }) => {
            let dirs = index_dirs(&index, &config)?;
            let outcome = load_eager(&dirs, &config)?;
            stats::show_stats(&outcome, &dirs);
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Check { index }) => {
            let dirs = index_dirs(&index, &config)?;
            let outcome = load_eager(&dirs, &config)?;
            Ok(if stats::check(&outcome) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
        #[cfg(all(unix, feature = "daemon"))]
        Some(Commands::Daemon { action }) => {
            handle_daemon_command(action, config)?;
            Ok(ExitCode::SUCCESS)
        }
        None if cli.query.is_empty() => run_tui(None, &cli.index, &config),
        None => run_search(&cli.query.join(" "), &cli.index, &cli.search, &config),
    }
}

fn index_dirs(args: &IndexArgs, config: &AppConfig) -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(resolve_index_dirs(&args.index, config, &cwd))
}

fn load_eager(dirs: &[PathBuf], config: &AppConfig) -> Result<dxi::index::LoadOutcome> {
    let mut loader = IndexLoader::with_patterns(&config.shard_patterns)?;
    for dir in dirs {
        loader.add_dir(dir);
    }
    let spinner = load_spinner("Loading shards...");
    let outcome = loader.load();
    spinner.finish_and_clear();
    Ok(outcome?)
}

fn run_search(query: &str, index: &IndexArgs, args: &SearchArgs, config: &AppConfig) -> Result<ExitCode> {
    let dirs = index_dirs(index, config)?;
    let options = SearchOptions {
        section: args.kind,
        scope: args.scope.clone(),
        limit: match args.limit {
            Some(0) => None,
            Some(n) => Some(n),
            None => config.effective_limit(),
        },
    };
    let lazy = wants_lazy(index, config);

    let hits = match search_via_daemon(query, &dirs, &options, skip_daemon(args, lazy)) {
        Some(hits) => hits,
        None => {
            let spinner = load_spinner("Loading shards...");
            let opened = open_table(&dirs, &config.shard_patterns, lazy);
            spinner.finish_and_clear();
            let opened = opened?;
            QueryEngine::new(opened.table.as_ref()).search_with(query, &options)
        }
    };

    let resolve_dir = if args.resolve { dirs.last().map(PathBuf::as_path) } else { None };
    let printed = if args.json {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        output::print_json(&mut lock, &hits, resolve_dir).and_then(|_| lock.flush())
    } else {
        let stream = StandardStream::stdout(output::color_choice(&args.color));
        let mut lock = stream.lock();
        output::print_hits(&mut lock, &hits, query, resolve_dir).and_then(|_| lock.flush())
    };
    match printed {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e.into()),
        _ => {}
    }

    Ok(if hits.is_empty() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// `--lazy` or `lazy_loading` in the config
fn wants_lazy(index: &IndexArgs, config: &AppConfig) -> bool {
    index.lazy || config.lazy_loading
}

/// Lazy searches always run in-process
fn skip_daemon(args: &SearchArgs, lazy: bool) -> bool {
    args.no_daemon || lazy
}

/// Ask a running daemon; None means search locally
#[cfg(all(unix, feature = "daemon"))]
fn search_via_daemon(query: &str, dirs: &[PathBuf], options: &SearchOptions, skip: bool) -> Option<Vec<SearchHit>> {
    use dxi::server::{is_daemon_running, IndexClient};

    if skip || !is_daemon_running() {
        return None;
    }
    let mut client = IndexClient::connect()?;
    match client.search(query, dirs, options) {
        Ok(result) => {
            tracing::debug!(
                duration_ms = result.duration_ms,
                cached = result.cached,
                "served by daemon"
            );
            Some(result.hits)
        }
        Err(e) => {
            tracing::info!("daemon search failed, searching locally: {}", e);
            None
        }
    }
}

#[cfg(not(all(unix, feature = "daemon")))]
fn search_via_daemon(_query: &str, _dirs: &[PathBuf], _options: &SearchOptions, _skip: bool) -> Option<Vec<SearchHit>> {
    None
}

#[cfg(feature = "interactive")]
fn run_tui(query: Option<String>, index: &IndexArgs, config: &AppConfig) -> Result<ExitCode> {
    let dirs = index_dirs(index, config)?;
    dxi::tui::run(
        dirs,
        config.shard_patterns.clone(),
        wants_lazy(index, config),
        config.effective_limit(),
        query,
    )?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "interactive"))]
fn run_tui(_query: Option<String>, _index: &IndexArgs, _config: &AppConfig) -> Result<ExitCode> {
    anyhow::bail!("built without the `interactive` feature; pass a query or use `dxi search`")
}

#[cfg(all(unix, feature = "daemon"))]
fn handle_daemon_command(action: DaemonAction, config: AppConfig) -> Result<()> {
    use dxi::server::daemon;
    use dxi::server::{get_socket_path, is_daemon_running, IndexClient};

    match action {
        DaemonAction::Start => {
            if is_daemon_running() {
                println!("Daemon is already running");
                return Ok(());
            }

            println!("Starting dxi daemon...");
            daemon::daemonize(config)?;

            std::thread::sleep(std::time::Duration::from_millis(500));

            if is_daemon_running() {
                println!("Daemon started (socket: {})", get_socket_path().display());
            } else {
                println!(
                    "Daemon may have failed to start. Check {}",
                    daemon::error_log_path().display()
                );
            }
        }

        DaemonAction::Stop => {
            if !is_daemon_running() {
                println!("Daemon is not running");
                return Ok(());
            }

            println!("Stopping daemon...");

            // Graceful shutdown first
            if let Some(mut client) = IndexClient::connect() {
                let _ = client.shutdown();
                std::thread::sleep(std::time::Duration::from_millis(500));
            }

            if is_daemon_running() {
                daemon::stop_daemon()?;
            }

            println!("Daemon stopped");
        }

        DaemonAction::Status => {
            if !is_daemon_running() {
                println!("Daemon is not running");
                return Ok(());
            }

            let mut client = IndexClient::connect_required()?;
            let status = client.status()?;
            println!("dxi daemon status:");
            println!("  Uptime: {}s", status.uptime_secs);
            println!("  Indexes loaded: {}", status.indexes_loaded);
            println!("  Shards: {}", status.total_shards);
            println!("  Resident tokens: {}", status.total_tokens);
            println!("  Queries served: {}", status.queries_served);
            println!("  Cache hit rate: {:.1}%", status.cache_hit_rate * 100.0);
            if !status.loaded_dirs.is_empty() {
                println!("  Loaded search dirs:");
                for dirs in &status.loaded_dirs {
                    let joined: Vec<String> = dirs.iter().map(|d| d.display().to_string()).collect();
                    println!("    - {}", joined.join(", "));
                }
            }
        }

        DaemonAction::Foreground => {
            if is_daemon_running() {
                println!("Daemon is already running in background. Stop it first with 'dxi daemon stop'");
                return Ok(());
            }

            println!("Running daemon in foreground (Ctrl+C to stop)...");
            daemon::run_foreground(config)?;
        }

        DaemonAction::Reload { index } => {
            if !is_daemon_running() {
                println!("Daemon is not running. Start it with 'dxi daemon start'");
                return Ok(());
            }

            let dirs = index_dirs(&index, &config)?;
            let mut client = IndexClient::connect_required()?;
            let (success, message) = client.reload(&dirs)?;
            if success {
                println!("Reloaded: {}", message);
            } else {
                anyhow::bail!("Reload failed: {}", message);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_args(extra: &[&str]) -> (IndexArgs, SearchArgs) {
        let mut argv = vec!["dxi", "search"];
        argv.extend_from_slice(extra);
        argv.push("key");
        match Cli::parse_from(argv).command {
            Some(Commands::Search { index, search, .. }) => (index, search),
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn test_lazy_config_skips_daemon() {
        let (index, args) = search_args(&[]);
        let config = AppConfig {
            lazy_loading: true,
            ..Default::default()
        };
        assert!(skip_daemon(&args, wants_lazy(&index, &config)));
        assert!(!skip_daemon(&args, wants_lazy(&index, &AppConfig::default())));
    }

    #[test]
    fn test_lazy_flag_and_no_daemon_skip_daemon() {
        let config = AppConfig::default();
        let (index, args) = search_args(&["--lazy"]);
        assert!(skip_daemon(&args, wants_lazy(&index, &config)));

        let (index, args) = search_args(&["--no-daemon"]);
        assert!(skip_daemon(&args, wants_lazy(&index, &config)));
    }
}
