use std::process::ExitCode;

use tracing::{error, info};

mod app;

fn main() -> ExitCode {
    app::bootstrap::init_tracing();
    info!("=== Euskal Quest Startup ===");

    let wiring = match app::bootstrap::build_app() {
        Ok(wiring) => wiring,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    app::loop_runner::run(wiring)
}
