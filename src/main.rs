use std::sync::Arc;

use clap::Parser;
use pictura::config::{ControllerSettings, ImagenSettings, setup_logging};
use pictura::controller::RequestController;
use pictura::imagen::ImagenClient;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = pictura::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let controller_settings = match ControllerSettings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };
    let imagen_settings = match ImagenSettings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Configuration error: {}", err);
            return;
        }
    };
    info!("Using model {}", imagen_settings.model);

    let client = ImagenClient::new(imagen_settings);
    let controller = RequestController::new(Arc::new(client), controller_settings);

    if let Err(err) = pictura::web::setup_server(&cli.listen_address, cli.port, controller).await {
        error!("Application error: {}", err);
    }
}
