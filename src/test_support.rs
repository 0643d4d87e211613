//! Servicio de recuperación falso para los tests.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

use crate::config::AppConfig;

pub const LONG_DESCRIPTION: &str = "Retrato de medio cuerpo de una dama vestida de negro, \
con mantilla de encaje y abanico, sobre fondo neutro. Procede del legado de la familia Trénor.";

/// Levanta el servicio falso en un puerto libre y devuelve la URL del endpoint.
///
/// Consultas reconocidas:
/// - `boom`: HTTP 500
/// - `roto`: 200 con un cuerpo que no es JSON
/// - `vacio`: lista vacía con texto alternativo
/// - `seis`: seis resultados
/// - `lento`: el retrato, con 150 ms de retraso
/// - `eco ...`: devuelve la consulta recibida en `respuesta`
/// - cualquier otra: un único retrato
pub async fn spawn_retrieval_mock() -> Url {
    let app = Router::new().route("/embeddings/retrieve", get(mock_retrieve));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/embeddings/retrieve")).unwrap()
}

async fn mock_retrieve(Query(params): Query<HashMap<String, String>>) -> Response {
    let query = params.get("query").cloned().unwrap_or_default();
    match query.as_str() {
        "boom" => (StatusCode::INTERNAL_SERVER_ERROR, "fallo interno").into_response(),
        "roto" => (StatusCode::OK, "esto no es json").into_response(),
        "vacio" => Json(json!({ "resultados": [], "respuesta": "Nada por aquí" })).into_response(),
        "seis" => {
            let results: Vec<Value> = (1..=6)
                .map(|n| json!({ "id": format!("obra-{n}"), "title": format!("Obra {n}") }))
                .collect();
            Json(json!({ "results": results })).into_response()
        }
        "lento" => {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Json(retrato()).into_response()
        }
        q if q.starts_with("eco") => {
            Json(json!({ "results": [], "respuesta": format!("eco: {q}") })).into_response()
        }
        _ => Json(retrato()).into_response(),
    }
}

fn retrato() -> Value {
    json!({
        "results": [{
            "id": "retrato-1",
            "titulo": "Retrato de dama",
            "autor": ["Juan", "Ana"],
            "descripcion": LONG_DESCRIPTION,
            "link": "https://colecciones.uv.es/s/patrimonio-artistico-es/item/1",
            "imagen": "https://colecciones.uv.es/files/original/1.jpg",
            "coleccion": "Pintura"
        }]
    })
}

/// Configuración por defecto apuntando al endpoint indicado.
pub fn test_config(retrieval_url: Url) -> AppConfig {
    let mut cfg = AppConfig::from_lookup(|_| None).unwrap();
    cfg.retrieval_url = retrieval_url;
    cfg
}
