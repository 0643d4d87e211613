//! Cliente HTTP del servicio de recuperación (`/embeddings/retrieve`).

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("el servicio de recuperación respondió con estado {0}")]
    Status(StatusCode),
    #[error("fallo en la comunicación con el servicio de recuperación: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("la respuesta del servicio de recuperación no es JSON válido: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Respuesta cruda del servicio, tal y como llegó.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct RetrievalClient {
    http: Client,
    endpoint: Url,
}

impl RetrievalClient {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, RetrievalError> {
        let http = Client::builder()
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.request_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: cfg.retrieval_url.clone(),
        })
    }

    /// URL final con el texto de la consulta codificado en `query`.
    pub fn query_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("query", query);
        url
    }

    /// Una única petición GET, sin reintentos. No interpreta el estado.
    pub async fn fetch_raw(&self, query: &str) -> Result<RawResponse, RetrievalError> {
        let url = self.query_url(query);
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }

    /// Consulta el servicio y devuelve el cuerpo JSON de una respuesta correcta.
    pub async fn retrieve(&self, query: &str) -> Result<Value, RetrievalError> {
        let raw = self.fetch_raw(query).await?;
        if !raw.status.is_success() {
            return Err(RetrievalError::Status(raw.status));
        }
        let body: Value = serde_json::from_str(&raw.body)?;
        info!("Respuesta de recuperación recibida ({} bytes)", raw.body.len());
        Ok(body)
    }
}
