//! authgate CLI - operator tools for the authgate auth gateway.

mod commands;
mod ui;

use authgate_core::Config;
use authgate_core::config::LogFormat;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "authgate")]
#[command(about = "authgate - authenticating gateway tools")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: ~/.authgate/authgate.json)
    #[arg(short, long, global = true, env = "AUTHGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random cookie secret
    Secret {
        /// Secret length in bytes
        #[arg(long, default_value_t = 32)]
        bytes: usize,
    },

    /// Configuration checks
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Print the provider authorization URL
    LoginUrl {
        /// Callback URL registered with the provider
        #[arg(long)]
        redirect_uri: String,

        /// Opaque state value
        #[arg(long, default_value = "")]
        state: String,

        /// OIDC nonce
        #[arg(long, default_value = "")]
        nonce: String,

        /// Extra query parameter as key=value (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Session inspection
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },

    /// Hash a password for the basic-auth users file
    HashPassword {
        /// Username for the entry
        #[arg(long)]
        username: String,

        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate configuration and build its provider and store
    Validate,

    /// Print the configuration file path
    Path,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Decode the session referenced by a Cookie header
    Inspect {
        /// Raw Cookie header value
        #[arg(long)]
        cookie: String,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

/// Install the tracing subscriber. Settings come from the config file when it loads.
fn init_logging(verbose: bool, config_path: Option<&Path>) {
    let settings = config_path
        .map_or_else(Config::load_default, Config::load)
        .map(|c| c.settings)
        .unwrap_or_default();

    let filter = if verbose || settings.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match settings.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    init_logging(cli.verbose, config_path);

    match cli.command {
        Commands::Secret { bytes } => commands::run_secret(bytes),

        Commands::Config { action } => match action {
            ConfigCommands::Validate => commands::run_config_validate(config_path).await?,
            ConfigCommands::Path => {
                let path = config_path.map_or_else(Config::default_path, Path::to_path_buf);
                println!("{}", path.display());
            }
        },

        Commands::LoginUrl {
            redirect_uri,
            state,
            nonce,
            params,
        } => {
            let args = commands::login_url::LoginUrlArgs {
                redirect_uri,
                state,
                nonce,
                params,
            };
            commands::run_login_url(config_path, &args)?;
        }

        Commands::Session { action } => match action {
            SessionCommands::Inspect { cookie, json } => {
                commands::run_session_inspect(config_path, &cookie, json).await?;
            }
        },

        Commands::HashPassword { username, password } => {
            commands::run_hash_password(&username, password)?;
        }
    }

    Ok(())
}
