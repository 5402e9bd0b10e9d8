pub mod connect;
pub mod http;
pub mod listener;
pub mod request;
pub mod response;
pub mod upstream;

use anyhow::Result;
use std::sync::Arc;

use crate::settings::Settings;

pub use listener::serve;

#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
}

impl AppContext {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

pub async fn run(app: AppContext) -> Result<()> {
    listener::start_listener(app).await
}
