use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;
use crate::config::Config;
use crate::error::Result;

/// framebridge - Drive a content context remotely over a request/response bridge
#[derive(Parser)]
#[command(name = "framebridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (overrides the default location)
    #[arg(long, env = "FRAMEBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Bridge host
    #[arg(long, env = "FRAMEBRIDGE_HOST", global = true)]
    pub host: Option<String>,

    /// Bridge port
    #[arg(short, long, env = "FRAMEBRIDGE_PORT", global = true)]
    pub port: Option<u16>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the content side and accept controller connections
    Serve {
        /// Page fixture (JSON) to load instead of the configured one
        #[arg(long)]
        document: Option<PathBuf>,
    },

    /// Invoke a remote method by name
    Call {
        /// Method name (e.g., "evaluate", "createWorker")
        method: String,

        /// Positional params, each parsed as JSON or taken as a plain string
        #[arg(allow_hyphen_values = true)]
        params: Vec<String>,
    },

    /// Evaluate an expression in the content context
    Eval {
        /// Expression (e.g., "document.title")
        code: String,
    },

    /// Click the center of the element an expression resolves to
    Click {
        /// Element expression (e.g., "document.querySelector('#send')")
        path: String,
    },

    /// Background worker management
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum WorkerCommands {
    /// Start a worker and wait until it is ready
    Create {
        /// Worker script url
        url: String,
    },

    /// Stop a worker
    Terminate {
        /// Worker script url
        url: String,
    },

    /// Send a message to a worker and wait for its reply
    Post {
        /// Worker script url
        url: String,

        /// Message, parsed as JSON or taken as a plain string
        #[arg(allow_hyphen_values = true)]
        message: String,

        /// Use the uncorrelated worker-post channel instead of a method call
        #[arg(long)]
        direct: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "bridge.port")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show configuration file path
    Path,
}

impl Cli {
    /// Configuration file in effect for this invocation
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::config_path)
    }

    /// Load configuration and apply command-line overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_from(&self.config_path())?;
        if let Some(host) = &self.host {
            config.bridge.host = host.clone();
        }
        if let Some(port) = self.port {
            config.bridge.port = port;
        }
        Ok(config)
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Serve { document } => commands::serve::run(self, document.as_deref()).await,
            Commands::Call { method, params } => commands::call::run(self, method, params).await,
            Commands::Eval { code } => commands::call::eval(self, code).await,
            Commands::Click { path } => commands::call::click(self, path).await,
            Commands::Worker { command } => commands::worker::run(self, command).await,
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn call_accepts_negative_params() {
        let cli = Cli::try_parse_from(["framebridge", "call", "evaluate", "-1"]).unwrap();
        match cli.command {
            Commands::Call { method, params } => {
                assert_eq!(method, "evaluate");
                assert_eq!(params, vec!["-1"]);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn port_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cli = Cli::try_parse_from([
            "framebridge",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "4242",
            "eval",
            "1",
        ])
        .unwrap();
        assert_eq!(cli.load_config().unwrap().bridge.port, 4242);
    }
}
