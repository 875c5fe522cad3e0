use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::filter::{Directive, EnvFilter};

use mirbot::infrastructure::modules::ModuleCatalog;
use mirbot::infrastructure::storage::MemoryStore;
use mirbot::{BotError, Config, MirCore};

#[derive(Parser)]
#[command(name = "mirbot")]
#[command(about = "A modular IRC bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Server host (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Keep variables in memory instead of the database
    #[arg(long)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run the bot
    Run,
    /// Show version
    Version,
    /// Print a default config
    InitConfig,
    /// Validate the config file
    CheckConfig,
}

fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run => match load_config(&cli) {
            Ok(config) => match run_bot(config, cli.ephemeral) {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("{}", e);
                    e.exit_code()
                }
            },
            Err(code) => code,
        },
        Commands::Version => {
            println!("mirbot v{}", env!("CARGO_PKG_VERSION"));
            0
        }
        Commands::InitConfig => {
            init_logging("info");
            init_config()
        }
        Commands::CheckConfig => match load_config(&cli) {
            Ok(config) => check_config(&config),
            Err(code) => code,
        },
    };
    std::process::exit(code);
}

fn init_logging(level: &str) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(log_filter(level, rust_log.as_deref()))
        .init();
}

/// `RUST_LOG` wins; the configured level is the default directive
fn log_filter(level: &str, rust_log: Option<&str>) -> EnvFilter {
    let directive: Directive = level
        .parse()
        .unwrap_or_else(|_| tracing::Level::INFO.into());

    EnvFilter::builder()
        .with_default_directive(directive)
        .parse_lossy(rust_log.unwrap_or_default())
}

/// Read the config and install logging at its level. A config that cannot be
/// read is reported at the default level and turned into an exit code.
fn load_config(cli: &Cli) -> Result<Config, i32> {
    match read_config(cli) {
        Ok(config) => {
            init_logging(&config.logging.level);
            Ok(config)
        }
        Err(e) => {
            init_logging("info");
            tracing::error!("{}", e);
            Err(e.exit_code())
        }
    }
}

fn read_config(cli: &Cli) -> Result<Config, BotError> {
    let mut config = if Path::new(&cli.config).exists() {
        let mut config = Config::load(&cli.config)?;
        config.apply_env()?;
        config
    } else {
        Config::load_env()?
    };

    if let Some(server) = &cli.server {
        config.server.host = server.clone();
    }
    Ok(config)
}

fn run_bot(config: Config, ephemeral: bool) -> Result<i32, BotError> {
    config.validate()?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(async move {
        let mut core = if ephemeral {
            tracing::info!("Using in-memory variable store");
            MirCore::with_parts(config, Arc::new(MemoryStore::new()), ModuleCatalog::new())?
        } else {
            MirCore::new(config)?
        };
        tracing::info!("Modules loaded: {:?}", core.loaded_modules());

        core.connect().await?;
        core.send_commands()?;

        let handle = core.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, quitting");
                if let Err(e) = handle.send("QUIT :Shutting down") {
                    tracing::warn!("Failed to send QUIT: {}", e);
                }
            }
        });

        let outcome = core.listen().await?;
        Ok::<i32, BotError>(outcome.exit_code())
    })
}

fn init_config() -> i32 {
    match Config::default().to_yaml() {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("# Save this to config.yaml and adjust as needed.");
            0
        }
        Err(e) => {
            tracing::error!("{}", e);
            2
        }
    }
}

fn check_config(config: &Config) -> i32 {
    match config.validate() {
        Ok(()) => {
            println!(
                "Config OK: {} on {} ({} channel(s), modules from {})",
                config.bot.nick,
                config.server.address(),
                config.channels.len(),
                config.modules.directory.display()
            );
            0
        }
        Err(e) => {
            eprintln!("Config invalid: {}", e);
            2
        }
    }
}
