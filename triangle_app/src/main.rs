//! Triangle demo application
//!
//! Opens a window and draws a hardcoded triangle with the shaders from the
//! configured schematic until the window is closed.

use std::process::ExitCode;

use strata_engine::foundation::logging;
use strata_engine::prelude::*;

const CONFIG_PATH: &str = "config/app.toml";

fn run() -> Result<(), AppError> {
    let config = AppConfig::load_or_default(CONFIG_PATH)?;
    config.validate()?;

    let mut app = Application::from_config(&config)?;
    let close = app.close_handle();
    app.add_layer(Box::new(RenderLayer::new(&config, close)))?;

    app.initialize()?;
    app.run()?;
    app.shutdown()
}

fn main() -> ExitCode {
    logging::init(log::LevelFilter::Info);
    log::info!("Starting triangle demo");

    match run() {
        Ok(()) => {
            log::info!("Triangle demo exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Triangle demo failed: {}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                log::error!("  caused by: {}", cause);
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
