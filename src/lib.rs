pub mod api;
pub mod cli;
pub mod config;
pub mod session;
pub mod store;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::api::{ApiClient, ReqwestTransport, Transport, WeatherClient};
use crate::config::Config;
use crate::session::{SessionGate, SessionManager};
use crate::store::{CredentialStore, FileStore, KeyValueStore};

/// Everything a front end needs, wired from one configuration.
pub struct AppContext {
    pub config: Config,
    pub client: Arc<ApiClient>,
    pub session: Arc<SessionManager>,
    pub weather: WeatherClient,
}

impl AppContext {
    /// Build with the `reqwest` transport and the file-backed store.
    pub fn new(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.server.timeout())
            .context("Failed to create HTTP client")?;
        let store = FileStore::new(config.storage.path.clone());
        Ok(Self::with_parts(config, Arc::new(transport), Arc::new(store)))
    }

    /// Build from explicit transport and storage backends.
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let credentials = Arc::new(CredentialStore::new(store));
        let client = Arc::new(ApiClient::new(
            config.server.base_url.clone(),
            config.endpoints.clone(),
            transport.clone(),
            credentials,
        ));
        let session = Arc::new(SessionManager::new(client.clone()));
        let weather = WeatherClient::new(&config.weather, transport);

        Self {
            config,
            client,
            session,
            weather,
        }
    }

    /// Start a session gate using the configured interval.
    pub fn spawn_gate(&self) -> SessionGate {
        SessionGate::spawn(self.session.clone(), &self.config.gate)
    }
}
