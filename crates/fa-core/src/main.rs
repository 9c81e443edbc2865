//! Fuzzing Agent - target supervisor
//!
//! The entry point for fa-agent, handling:
//! - The TCP command listener (`serve`, the default)
//! - Configuration inspection (`config`)
//! - Version reporting

use clap::{Args, Parser, Subcommand};
use fa_config::{load_config, validate_config, AgentConfig, ConfigOverrides, LoadedConfig};
use fa_core::action::PtraceControl;
use fa_core::exit_codes::ExitCode;
use fa_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use fa_core::protocol::{self, MonitorFactory};
use fa_core::supervision::Monitor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Fuzzing agent - launches, attaches to, and watches fuzz targets
#[derive(Parser)]
#[command(name = "fa-agent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to agent.toml (overrides FA_AGENT_CONFIG and the search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr: human or jsonl
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the command protocol (default)
    Serve(ServeArgs),

    /// Print the resolved configuration
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Bind address
    #[arg(long)]
    listen: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Concurrent connections served
    #[arg(long)]
    max_connections: Option<usize>,
}

impl ServeArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            address: self.listen.clone(),
            port: self.port,
            max_connections: self.max_connections,
        }
    }
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Only validate and report where the configuration came from
    #[arg(long)]
    check: bool,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let exit_code = match &cli.command {
        None => run_serve(&cli.global, &ServeArgs::default()),
        Some(Commands::Serve(args)) => run_serve(&cli.global, args),
        Some(Commands::Config(args)) => run_config(&cli.global, args),
        Some(Commands::Version) => {
            print_version();
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

fn load(global: &GlobalOpts) -> Result<LoadedConfig, ExitCode> {
    load_config(global.config.as_deref()).map_err(|err| {
        error!(error = %err, code = err.code(), "configuration error");
        eprintln!("fa-agent: {err}");
        ExitCode::ConfigError
    })
}

fn run_serve(global: &GlobalOpts, args: &ServeArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let origin = loaded.describe_origin();
    let mut config: AgentConfig = loaded.config;
    let overrides = args.overrides();
    if !overrides.is_empty() {
        config.apply_overrides(&overrides);
        if let Err(err) = validate_config(&config) {
            eprintln!("fa-agent: {err}");
            return ExitCode::ArgsError;
        }
    }
    info!(source = %origin, "configuration loaded");

    let listener = match protocol::bind(&config.listener) {
        Ok(listener) => listener,
        Err(err) => {
            error!(
                address = %config.listener.address,
                port = config.listener.port,
                error = %err,
                "bind failed"
            );
            eprintln!(
                "fa-agent: cannot listen on {}:{}: {err}",
                config.listener.address, config.listener.port
            );
            return ExitCode::from_io_error(&err);
        }
    };

    let supervisor = config.supervisor.clone();
    let factory: MonitorFactory =
        Arc::new(move || Monitor::new(&supervisor, Arc::new(PtraceControl::new())));
    protocol::serve(listener, &config.listener, factory);
    ExitCode::Clean
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    if args.check {
        println!("ok: {}", loaded.describe_origin());
        return ExitCode::Clean;
    }

    match loaded.config.to_toml_string() {
        Ok(text) => {
            println!("# source: {}", loaded.describe_origin());
            print!("{text}");
            ExitCode::Clean
        }
        Err(err) => {
            eprintln!("fa-agent: {err}");
            ExitCode::InternalError
        }
    }
}

fn print_version() {
    println!("fa-agent {}", env!("CARGO_PKG_VERSION"));
}
