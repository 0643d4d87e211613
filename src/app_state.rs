use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::{config::AppConfig, retrieval::RetrievalClient, session::SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub retrieval: RetrievalClient,
    /// Una vista de chat por navegador.
    pub sessions: Arc<SessionStore>,
    /// Limita las llamadas simultáneas al servicio externo desde `/api/search`.
    pub proxy_limiter: Arc<Semaphore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub status_code: u8,
    pub message: String,
    pub busy: bool,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let retrieval = RetrievalClient::from_config(&config)
            .context("Error creando el cliente del servicio de recuperación")?;
        Ok(Self {
            retrieval,
            sessions: Arc::new(SessionStore::from_config(&config)),
            proxy_limiter: Arc::new(Semaphore::new(config.proxy_max_concurrency)),
            config,
        })
    }

    pub fn status(&self) -> Status {
        Status {
            status_code: 1,
            message: "Servicio ACTIVO".to_string(),
            busy: self.sessions.any_waiting(),
        }
    }
}
