//! infra - manage AWS resources from the command line
//!
//! This is the main entry point for the infra CLI.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{completions, Cli, Commands};
use infra::aws::load_sdk_config;
use infra::config::{Config, LogFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse_args();

    if let Commands::Completions(args) = &cli.command {
        if args.instructions {
            completions::print_installation_instructions(args.shell);
        } else {
            completions::generate_completions(args.shell);
        }
        return;
    }

    let exit_code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            let use_color = !cli.no_color && std::env::var("NO_COLOR").is_err();
            cli::output::OutputFormatter::new(Default::default(), use_color, 0)
                .error(&format!("{:#}", e));
            e.downcast_ref::<infra::error::Error>()
                .map_or(1, infra::error::Error::exit_code)
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: &Cli) -> Result<i32> {
    // Load configuration; an explicit --config must exist and parse
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);

    // Initialize logging based on verbosity
    init_logging(cli.verbosity(), config.logging.level.as_deref(), config.logging.format);
    tracing::debug!("infra v{}", infra::VERSION);

    let sdk = load_sdk_config(&config.aws).await;
    let mut ctx = CommandContext::new(config, sdk, cli.verbosity());

    // Execute the appropriate command
    match &cli.command {
        Commands::Sts(args) => args.execute(&mut ctx).await,
        Commands::Ec2(args) => args.execute(&mut ctx).await,
        Commands::S3(args) => args.execute(&mut ctx).await,
        Commands::Kms(args) => args.execute(&mut ctx).await,
        Commands::Cfn(args) => args.execute(&mut ctx).await,
        Commands::Ssm(args) => args.execute(&mut ctx).await,
        Commands::Asg(args) => args.execute(&mut ctx).await,
        Commands::Completions(_) => Ok(0),
    }
}

/// Initialize logging based on verbosity level
///
/// `RUST_LOG` wins, then `-v` flags, then the configured level.
fn init_logging(verbosity: u8, configured: Option<&str>, format: LogFormat) {
    let filter = match (verbosity, configured) {
        (0, Some(level)) => level,
        (0, None) => "warn",
        (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
