//! CLI for the darray distributed array library.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use darray_core::{config, logging};

use commands::{run_apply, run_create, run_get, run_master, run_worker};

/// Top-level CLI for the darray distributed array library.
#[derive(Debug, Parser)]
#[command(name = "darray")]
#[command(about = "darray: distributed array compute over a worker fleet", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the master coordinator.
    Master {
        /// TCP port to listen on (overrides the config file).
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Run a worker node connected to a master.
    Worker {
        /// Identifier this worker registers under.
        worker_id: String,
        /// Master host to dial.
        master_host: String,
        /// Master port to dial.
        master_port: u16,
    },

    /// Create an int array filled with random values in 1..=1000.
    CreateInt {
        /// Array identifier.
        array_id: String,
        /// Number of elements to generate.
        size: usize,
        /// Master host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Master port (default: config file).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create a double array filled with random values in 1.0..100.0.
    CreateDouble {
        /// Array identifier.
        array_id: String,
        /// Number of elements to generate.
        size: usize,
        /// Master host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Master port (default: config file).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply an element-wise operation to an array (example1 or example2).
    Apply {
        /// Array identifier.
        array_id: String,
        /// Operation name.
        operation: String,
        /// Master host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Master port (default: config file).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Fetch the result of the last operation on an array.
    Get {
        /// Array identifier.
        array_id: String,
        /// Master host.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Master port (default: config file).
        #[arg(long)]
        port: Option<u16>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;

        let node = match &cli.command {
            CliCommand::Master { .. } => "master".to_string(),
            CliCommand::Worker { worker_id, .. } => format!("worker-{worker_id}"),
            _ => "client".to_string(),
        };
        if logging::init_logging(&node).is_err() {
            logging::init_logging_stderr();
        }
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Master { port } => run_master(&cfg, port).await,
            CliCommand::Worker {
                worker_id,
                master_host,
                master_port,
            } => run_worker(&cfg, worker_id, master_host, master_port).await,
            CliCommand::CreateInt {
                array_id,
                size,
                host,
                port,
            } => run_create(&cfg, &array_id, size, false, &host, port).await,
            CliCommand::CreateDouble {
                array_id,
                size,
                host,
                port,
            } => run_create(&cfg, &array_id, size, true, &host, port).await,
            CliCommand::Apply {
                array_id,
                operation,
                host,
                port,
            } => run_apply(&cfg, &array_id, &operation, &host, port).await,
            CliCommand::Get {
                array_id,
                host,
                port,
            } => run_get(&cfg, &array_id, &host, port).await,
        }
    }
}
