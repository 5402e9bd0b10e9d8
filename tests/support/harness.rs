use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use tunnelproxy::{
    proxy::{self, AppContext},
    settings::Settings,
};

use super::ProxyClient;

fn default_test_settings(listen: SocketAddr) -> Settings {
    Settings {
        listen,
        max_header_size: 8 * 1024,
        max_request_body_size: 1024 * 1024,
        header_read_chunk: 512,
        relay_buffer_size: 4096,
        ..Settings::default()
    }
}

pub struct ProxyHarness {
    pub addr: SocketAddr,
    pub settings: Arc<Settings>,
    handle: JoinHandle<()>,
}

impl ProxyHarness {
    pub async fn start() -> Result<Self> {
        ProxyHarnessBuilder::new().spawn().await
    }

    pub async fn connect(&self) -> Result<TcpStream> {
        Ok(TcpStream::connect(self.addr).await?)
    }

    pub async fn client(&self) -> Result<ProxyClient> {
        ProxyClient::connect(self.addr).await
    }

    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

#[derive(Default)]
pub struct ProxyHarnessBuilder {
    settings_override: Option<Box<dyn FnOnce(&mut Settings) + Send>>,
}

impl ProxyHarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings<F>(mut self, func: F) -> Self
    where
        F: FnOnce(&mut Settings) + Send + 'static,
    {
        self.settings_override = Some(Box::new(func));
        self
    }

    pub async fn spawn(mut self) -> Result<ProxyHarness> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;

        let mut settings = default_test_settings(addr);
        if let Some(override_fn) = self.settings_override.take() {
            override_fn(&mut settings);
        }
        settings.validate()?;
        let settings = Arc::new(settings);

        let app = AppContext::new(settings.clone());
        let handle = tokio::spawn(async move {
            if let Err(err) = proxy::serve(listener, app).await {
                tracing::error!(error = ?err, "proxy serve failed");
            }
        });

        Ok(ProxyHarness {
            addr,
            settings,
            handle,
        })
    }
}
