mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Parse CLI and dispatch; logging is initialized per node kind inside.
    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("darray error: {:#}", err);
        std::process::exit(1);
    }
}
