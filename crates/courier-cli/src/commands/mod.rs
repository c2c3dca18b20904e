use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use std::sync::Arc;

use courier_config::schema::LoggingConfig;
use courier_config::{ConfigLoader, CourierConfig, WarningSeverity};
use courier_core::{CourierError, Result};
use courier_ledger::{Ed25519Signer, Signer};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

mod start;

/// 📨 Courier: auto-reply agent for encrypted on-chain messaging channels
#[derive(Parser)]
#[command(name = "courier", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to courier.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent (poll loop + status server)
    Start {
        /// Don't start the status server
        #[arg(long)]
        no_server: bool,
    },
    /// Show a running agent's status
    Status,
    /// Show current configuration (secrets redacted)
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration
    Doctor,
    /// Print the ledger address derived from the configured private key
    Address,
    /// Show version and build info
    Version,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };
        init_tracing(&config.logging, log_level)?;

        match self.command {
            Commands::Start { no_server } => start::cmd_start(config, no_server).await,
            Commands::Status => Self::cmd_status(config).await,
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Doctor => Self::cmd_doctor(config, config_loader.path()),
            Commands::Address => Self::cmd_address(config),
            Commands::Version => Self::cmd_version(),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    async fn cmd_status(config: CourierConfig) -> Result<()> {
        let listen = &config.server.listen;
        println!("Checking status at http://{listen}...");

        let client = reqwest::Client::builder()
            .tcp_keepalive(None)
            .build()
            .unwrap_or_default();
        match client
            .get(format!("http://{listen}/api/v1/status"))
            .send()
            .await
        {
            Ok(resp) => {
                let data: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| CourierError::Decode(e.to_string()))?;
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
            Err(_) => {
                println!("❌ Agent is not running at {listen}");
            }
        }
        Ok(())
    }

    fn cmd_config(config: CourierConfig, json: bool) -> Result<()> {
        let shown = config.redacted();
        if json {
            println!("{}", serde_json::to_string_pretty(&shown)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&shown).map_err(|e| CourierError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_doctor(config: CourierConfig, path: &std::path::Path) -> Result<()> {
        println!("🩺 Courier Doctor: configuration audit");
        println!("   Config: {}", path.display());
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };
        for w in &warnings {
            println!("  {w}");
        }
        let warn_count = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Warning)
            .count();

        match config.validate_for_start() {
            Ok(()) => println!("  ✅ ready to start"),
            Err(e) => println!("  ❌ cannot start: {e}"),
        }
        if let Some(key) = config.agent.private_key.as_deref() {
            if let Err(e) = Ed25519Signer::from_base64(key) {
                println!("  ❌ agent.private_key: {e}");
            }
        }

        println!();
        println!("  ⚠️  {warn_count} warnings");
        Ok(())
    }

    fn cmd_address(config: CourierConfig) -> Result<()> {
        let signer = signer_from_config(&config)?;
        println!("{}", signer.address());
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("📨 Courier v{}", env!("CARGO_PKG_VERSION"));
        println!("   Rust edition: 2024");
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "courier", &mut std::io::stdout());
        Ok(())
    }
}

/// The agent's signing key. Missing or undecodable keys are fatal.
fn signer_from_config(config: &CourierConfig) -> Result<Arc<Ed25519Signer>> {
    let key = config
        .agent
        .private_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| CourierError::ConfigValidation {
            field: "agent.private_key".into(),
            reason: "no private key configured (set agent.private_key or COURIER_PRIVATE_KEY)"
                .into(),
        })?;
    Ok(Arc::new(Ed25519Signer::from_base64(key)?))
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
fn init_tracing(logging: &LoggingConfig, level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (writer, ansi) = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    match logging.format.as_str() {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.compact().with_target(false).init(),
        _ => builder.with_target(false).init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_start_flags() {
        let cli = Cli::try_parse_from(["courier", "--config", "/tmp/c.toml", "start", "--no-server"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Start { no_server: true }));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["courier", "-v", "-q", "status"]).is_err());
    }

    #[test]
    fn signer_requires_a_key() {
        let mut config = CourierConfig::default();
        assert!(matches!(
            signer_from_config(&config),
            Err(CourierError::ConfigValidation { .. })
        ));

        config.agent.private_key = Some("not base64!".into());
        assert!(matches!(
            signer_from_config(&config),
            Err(CourierError::InvalidKey(_))
        ));

        // 32 zero bytes.
        config.agent.private_key = Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".into());
        let signer = signer_from_config(&config).unwrap();
        assert!(signer.address().starts_with("0x"));
    }
}
