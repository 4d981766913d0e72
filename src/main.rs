//! comfy-setup entry point.

use std::process::ExitCode;
use std::thread;

use clap::Parser;
use comfy_setup::channel::connect;
use comfy_setup::context::AppContext;
use comfy_setup::host::{Cli, Presets, TerminalHost};
use comfy_setup::orchestrator::{Orchestrator, Outcome};
use comfy_setup::InstallError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("comfy_setup=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("comfy_setup=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tracing::debug!("comfy-setup starting with args: {:?}", cli);

    let ctx = match AppContext::load(&cli.user_data_dir(), &cli.resources_dir()) {
        Ok(ctx) => ctx,
        Err(e @ InstallError::ConfigCorrupt { .. }) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    let mut host = TerminalHost::new(
        !cli.non_interactive,
        Presets {
            base_path: cli.base_path.clone(),
            device: cli.device,
        },
    );

    let (port, ui) = connect();
    let (drive_result, outcome) = thread::scope(|s| {
        let worker = s.spawn(|| Orchestrator::new(&ctx, port).run());
        let drive_result = host.drive(&ui);
        // Unblocks the orchestrator if the host gave up early.
        drop(ui);
        (drive_result, worker.join())
    });

    if let Err(e) = drive_result {
        eprintln!("Error: {}", e);
    }

    match outcome {
        Ok(Ok(Outcome::Ready(record))) => {
            if let Some(base) = record.base_path() {
                println!("{}", base.display());
            }
            ExitCode::SUCCESS
        }
        Ok(Ok(Outcome::Aborted(result))) => {
            for issue in result.issues() {
                eprintln!("Error: {}", issue.to_error());
            }
            ExitCode::from(1)
        }
        Ok(Ok(Outcome::UnsupportedHardware(_))) | Ok(Ok(Outcome::ConfigCorrupt(_))) => {
            ExitCode::from(2)
        }
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
        Err(_) => {
            eprintln!("Error: installer thread panicked");
            ExitCode::from(1)
        }
    }
}
