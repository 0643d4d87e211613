//! Modelos de dominio (mensajes del chat y resultados normalizados).

use serde::Serialize;
use uuid::Uuid;

/// Resultados que se muestran por página en el modo tarjetas.
pub const PAGE_SIZE: usize = 5;

/// Registro de resultado ya normalizado y decodificado, listo para pintarse.
/// Todos los campos de texto son texto plano (sin etiquetas ni entidades).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultItem {
    pub id: String,
    pub titulo: String,
    pub ubicacion: String,
    pub autor: String,
    pub descripcion: String,
    pub link: String,
    pub imagen: String,
    pub coleccion: String,
}

/// Contenido de un mensaje. Un mensaje del bot lleva exactamente uno de ellos;
/// los del usuario siempre son `Text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Html { html: String },
    Results {
        results: Vec<ResultItem>,
        total_registros: usize,
        total_pages: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    pub is_user: bool,
    #[serde(flatten)]
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            is_user: true,
            content: MessageContent::Text { text: text.into() },
        }
    }

    pub fn bot_text(text: impl Into<String>) -> Self {
        Self::bot(MessageContent::Text { text: text.into() })
    }

    pub fn bot_html(html: impl Into<String>) -> Self {
        Self::bot(MessageContent::Html { html: html.into() })
    }

    /// Mensaje del bot con la lista de resultados y sus metadatos de paginación.
    pub fn bot_results(results: Vec<ResultItem>) -> Self {
        let total_registros = results.len();
        Self::bot(MessageContent::Results {
            results,
            total_registros,
            total_pages: total_pages(total_registros),
        })
    }

    fn bot(content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            is_user: false,
            content,
        }
    }

    /// Texto plano del mensaje, si lo tiene.
    #[cfg(test)]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn total_pages(&self) -> Option<usize> {
        match &self.content {
            MessageContent::Results { total_pages, .. } => Some(*total_pages),
            _ => None,
        }
    }
}

/// `ceil(count / PAGE_SIZE)`.
pub fn total_pages(count: usize) -> usize {
    count.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(n: usize) -> ResultItem {
        ResultItem {
            id: format!("item-{n}"),
            titulo: format!("Obra {n}"),
            ubicacion: String::new(),
            autor: String::new(),
            descripcion: String::new(),
            link: String::new(),
            imagen: String::new(),
            coleccion: String::new(),
        }
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0), 0);
        assert_eq!(total_pages(1), 1);
        assert_eq!(total_pages(5), 1);
        assert_eq!(total_pages(6), 2);
        assert_eq!(total_pages(11), 3);
    }

    #[test]
    fn bot_results_carries_pagination_metadata() {
        let msg = Message::bot_results((0..6).map(item).collect());
        assert!(!msg.is_user);
        match msg.content {
            MessageContent::Results {
                total_registros,
                total_pages,
                ..
            } => {
                assert_eq!(total_registros, 6);
                assert_eq!(total_pages, 2);
            }
            other => panic!("contenido inesperado: {other:?}"),
        }
    }

    #[test]
    fn messages_get_distinct_ids() {
        let a = Message::user("hola");
        let b = Message::bot_text("adiós");
        assert_ne!(a.id, b.id);
        assert!(a.is_user);
        assert_eq!(a.text(), Some("hola"));
    }

    #[test]
    fn serializes_flattened_content() {
        let msg = Message::bot_html("<b>x</b>");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "html");
        assert_eq!(value["html"], "<b>x</b>");
        assert_eq!(value["is_user"], false);
    }
}
