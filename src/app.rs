use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};

use crate::core::{
    alerts::{engine::RuleEngine, matcher::CompiledRule},
    config::{ConfigManager, WardenConfig, DEFAULT_CONFIG_PATH},
    coordinator::Warden,
    replay::{replay, ConsolePlatform},
    roles::StaticRoles,
};

#[derive(Parser)]
#[command(name = "keyword-warden")]
#[command(about = "Keyword and pattern alerts for guild chat", long_about = None)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose (info-level) logging to stderr.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Enable debug-level logging to stderr.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the config and print a summary of every alert rule.
    Validate,

    /// Evaluate JSON-lines chat events and print the resulting actions.
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Events file. Reads stdin when omitted.
    input: Option<PathBuf>,

    /// User id of the warden itself; its own messages are never evaluated.
    #[arg(long, default_value = "warden")]
    bot_id: String,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    // Config problems and bad patterns stop us before any message is handled.
    let manager = ConfigManager::new(&cli.config);
    let config = manager
        .load()
        .with_context(|| format!("Error loading config from {}", manager.path().display()))?;
    let engine = RuleEngine::from_config(&config).context("Error compiling alert rules")?;
    info!(
        "Loaded {} alert rules from {}",
        engine.rules().len(),
        manager.path().display()
    );

    match cli.command {
        Commands::Validate => {
            for rule in engine.rules() {
                println!("{}", describe_rule(rule));
            }
            println!("{} alert rules OK", engine.rules().len());
            Ok(())
        }
        Commands::Replay(args) => run_replay(args, &config, engine),
    }
}

fn run_replay(args: ReplayArgs, config: &WardenConfig, engine: RuleEngine) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Error starting tokio runtime")?;

    let platform = Arc::new(ConsolePlatform::new(io::stdout()));
    let roles = Arc::new(StaticRoles::new());
    let warden = Warden::new(Arc::new(engine), platform, Arc::clone(&roles), args.bot_id)
        .with_config(config);

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Error opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let summary = runtime
        .block_on(replay(reader, &warden, &roles))
        .context("Error reading replay events")?;
    info!(
        "Replay finished: {} events, {} actions, {} skipped lines",
        summary.events, summary.actions, summary.skipped_lines
    );
    Ok(())
}

fn describe_rule(rule: &CompiledRule) -> String {
    let mut required: Vec<_> = rule.required_roles.iter().map(String::as_str).collect();
    let mut excluded: Vec<_> = rule.excluded_roles.iter().map(String::as_str).collect();
    required.sort_unstable();
    excluded.sort_unstable();

    let mut line = format!(
        "rule {}: {} matcher(s), link required: {}, required roles: {:?}, excluded roles: {:?}",
        rule.index,
        rule.matchers.len(),
        rule.external_link_required,
        required,
        excluded
    );
    if let Some(days) = rule.omit_members_older_than_days {
        line.push_str(&format!(", skips members older than {} days", days));
    }
    if rule.is_inert() {
        line.push_str(" (inert)");
    }
    line
}

/// Initialize logging based on CLI flags. `RUST_LOG` wins when set.
fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Also installs the log -> tracing bridge, so `log` records show up.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init();

    debug!("Logging initialized at level: {}", level);
}
