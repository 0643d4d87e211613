// Módulos de la aplicación
mod api;
mod app_state;
mod chat;
mod config;
mod models;
mod normalize;
mod render;
mod retrieval;
mod session;
#[cfg(test)]
mod test_support;

use crate::app_state::AppState;
use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;
    info!(
        "Servicio de recuperación: {} (modo {:?}, decodificador {:?})",
        cfg.retrieval_url, cfg.render_mode, cfg.html_decoder
    );

    // 3. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone())?;

    // 4. Configurar el router (incluye ficheros estáticos, CORS y trazas)
    let app = api::create_router(app_state);

    // 5. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    let server_url = format!("http://{}", cfg.server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Señal de apagado recibida, iniciando cierre del servidor.");
}
