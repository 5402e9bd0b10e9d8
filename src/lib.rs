pub mod cli;
pub mod logging;
pub mod proxy;
pub mod settings;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::settings::Settings;

pub async fn run(settings: Settings) -> Result<()> {
    let settings = Arc::new(settings);
    info!(
        max_header_size = settings.max_header_size,
        max_request_body_size = settings.max_request_body_size,
        connect_default_port = settings.connect_default_port,
        "starting proxy"
    );
    let app = proxy::AppContext::new(settings);
    proxy::run(app).await
}
