use std::env::consts::{ARCH, FAMILY, OS};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, trace};

use crate::engine::init_logger;
use crate::program::Program;

mod engine;
mod err;
mod program;

/// Downloads ERR video content listed in config.toml.
#[derive(Parser, Debug)]
#[command(name = "err_downloader", version, about)]
struct Args {
    /// Look for seasons of tracked shows that are not in the config yet
    #[arg(long)]
    discover: bool,

    /// Append discovered seasons to the config
    #[arg(long, requires = "discover")]
    add: bool,

    /// Directory holding config.toml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut program = match Program::new(&args.config_dir) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Held until exit so buffered file logs get flushed.
    let _guard = match init_logger(program.config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logger: {}. Continuing without logs.", e);
            None
        }
    };
    log_system_information();
    program.log_config_status();

    if args.discover {
        return match program.discover(args.add).await {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Discovery failed: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    match program.download().await {
        Ok(report) => {
            if !report.has_failures() {
                info!("All downloads completed successfully");
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            error!("Critical error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
