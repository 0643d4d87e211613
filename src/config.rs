//! Carga y gestión de configuración de la aplicación (servidor + servicio de recuperación).

use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

/// URL por defecto del servicio de embeddings de la UV.
pub const DEFAULT_RETRIEVAL_URL: &str = "http://iacom.uv.es:50005/embeddings/retrieve";

/// Forma en la que se pintan las respuestas con resultados.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Una tarjeta por resultado, paginadas de 5 en 5.
    Cards,
    /// Todos los resultados en un único bloque HTML.
    Combined,
}

impl RenderMode {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cards" | "tarjetas" => Ok(Self::Cards),
            "combined" | "combinado" => Ok(Self::Combined),
            other => Err(anyhow!("Modo de renderizado no soportado: {other}")),
        }
    }
}

/// Estrategia para decodificar el HTML que llega en los campos de texto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HtmlDecoder {
    /// Parseo completo como fragmento HTML (scraper).
    Dom,
    /// Expresiones regulares: quita etiquetas y las entidades básicas.
    Basic,
}

impl HtmlDecoder {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dom" => Ok(Self::Dom),
            "basic" | "regex" => Ok(Self::Basic),
            other => Err(anyhow!("Decodificador HTML no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub retrieval_url: Url,
    pub render_mode: RenderMode,
    pub html_decoder: HtmlDecoder,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub proxy_max_concurrency: usize,
    /// Sesiones de chat simultáneas como máximo; al llenarse se expulsa la más antigua.
    pub max_sessions: usize,
    pub session_ttl: Duration,
    pub static_dir: String,
    pub open_browser: bool,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo las claves con la función indicada.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());

        let retrieval_url_str =
            lookup("RETRIEVAL_URL").unwrap_or_else(|| DEFAULT_RETRIEVAL_URL.to_string());
        let retrieval_url = Url::parse(&retrieval_url_str)
            .with_context(|| format!("RETRIEVAL_URL no es una URL válida: {retrieval_url_str}"))?;
        if !matches!(retrieval_url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "RETRIEVAL_URL debe usar http o https: {retrieval_url_str}"
            ));
        }

        let render_mode =
            RenderMode::from_str(&lookup("RENDER_MODE").unwrap_or_else(|| "cards".to_string()))?;
        let html_decoder =
            HtmlDecoder::from_str(&lookup("HTML_DECODER").unwrap_or_else(|| "dom".to_string()))?;

        let connect_timeout = Duration::from_secs(parse_number(&lookup, "CONNECT_TIMEOUT_SECS", 5)?);
        let request_timeout = Duration::from_secs(parse_number(&lookup, "REQUEST_TIMEOUT_SECS", 15)?);

        let proxy_max_concurrency = parse_number(&lookup, "PROXY_MAX_CONCURRENCY", 50)? as usize;
        if proxy_max_concurrency == 0 {
            return Err(anyhow!("PROXY_MAX_CONCURRENCY debe ser mayor que 0"));
        }

        let max_sessions = parse_number(&lookup, "MAX_SESSIONS", 1000)? as usize;
        if max_sessions == 0 {
            return Err(anyhow!("MAX_SESSIONS debe ser mayor que 0"));
        }
        let session_ttl = Duration::from_secs(parse_number(&lookup, "SESSION_TTL_SECS", 3600)?);
        if session_ttl.is_zero() {
            return Err(anyhow!("SESSION_TTL_SECS debe ser mayor que 0"));
        }

        let static_dir = lookup("STATIC_DIR").unwrap_or_else(|| "frontend".to_string());

        let open_browser = match lookup("OPEN_BROWSER") {
            Some(value) => parse_bool(&value)
                .ok_or_else(|| anyhow!("OPEN_BROWSER no es un booleano válido: {value}"))?,
            None => false,
        };

        Ok(Self {
            server_addr,
            retrieval_url,
            render_mode,
            html_decoder,
            connect_timeout,
            request_timeout,
            proxy_max_concurrency,
            max_sessions,
            session_ttl,
            static_dir,
            open_browser,
        })
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} no es un número válido: {raw}")),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "si" | "sí" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = config_with(&[]).unwrap();
        assert_eq!(cfg.server_addr, "127.0.0.1:3322");
        assert_eq!(cfg.retrieval_url.as_str(), DEFAULT_RETRIEVAL_URL);
        assert_eq!(cfg.render_mode, RenderMode::Cards);
        assert_eq!(cfg.html_decoder, HtmlDecoder::Dom);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(5));
        assert_eq!(cfg.request_timeout, Duration::from_secs(15));
        assert_eq!(cfg.proxy_max_concurrency, 50);
        assert_eq!(cfg.max_sessions, 1000);
        assert_eq!(cfg.session_ttl, Duration::from_secs(3600));
        assert!(!cfg.open_browser);
    }

    #[test]
    fn reads_overrides() {
        let cfg = config_with(&[
            ("RENDER_MODE", "Combined"),
            ("HTML_DECODER", "basic"),
            ("REQUEST_TIMEOUT_SECS", "3"),
            ("OPEN_BROWSER", "true"),
            ("RETRIEVAL_URL", "https://example.org/retrieve"),
        ])
        .unwrap();
        assert_eq!(cfg.render_mode, RenderMode::Combined);
        assert_eq!(cfg.html_decoder, HtmlDecoder::Basic);
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));
        assert!(cfg.open_browser);
        assert_eq!(cfg.retrieval_url.host_str(), Some("example.org"));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(config_with(&[("RENDER_MODE", "carrusel")]).is_err());
        assert!(config_with(&[("RETRIEVAL_URL", "no es url")]).is_err());
        assert!(config_with(&[("RETRIEVAL_URL", "ftp://example.org/x")]).is_err());
        assert!(config_with(&[("CONNECT_TIMEOUT_SECS", "cinco")]).is_err());
        assert!(config_with(&[("PROXY_MAX_CONCURRENCY", "0")]).is_err());
        assert!(config_with(&[("OPEN_BROWSER", "quizá")]).is_err());
        assert!(config_with(&[("MAX_SESSIONS", "0")]).is_err());
        assert!(config_with(&[("SESSION_TTL_SECS", "0")]).is_err());
    }
}
