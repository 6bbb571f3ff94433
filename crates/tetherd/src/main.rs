use std::process::ExitCode;

use tracing::error;

fn main() -> ExitCode {
    match tetherd::run_agent() {
        Ok(()) => ExitCode::SUCCESS,
        Err(launch_error) => {
            if let Some(cli_error) = launch_error.cli_error() {
                cli_error.exit();
            }
            error!(
                target: concat!(env!("CARGO_PKG_NAME"), "::main"),
                error = %launch_error,
                "agent exited with an error"
            );
            ExitCode::FAILURE
        }
    }
}
