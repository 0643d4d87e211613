//! Estado de la vista de chat: mensajes, paginación y descripciones expandidas.
//!
//! Cada sesión de navegador tiene su propio `ChatView`, que se modifica sólo a
//! través de sus métodos; los renderizadores reciben `&ChatView`.
//!
//! Cada envío sustituye la conversación por el nuevo mensaje del usuario (sólo
//! se conserva el último intercambio) y abre una nueva generación. Las
//! respuestas que llegan para una generación anterior se descartan.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::RenderMode;
use crate::models::{Message, MessageContent, ResultItem, PAGE_SIZE};
use crate::normalize::RetrievalOutcome;
use crate::render;
use crate::retrieval::RetrievalError;

pub const ERROR_TEXT: &str = "❌ Error al obtener respuesta del servidor.";

/// Consulta en vuelo asociada a un envío concreto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub generation: u64,
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    messages: Vec<Message>,
    pages: HashMap<String, usize>,
    expanded: HashMap<String, bool>,
    #[serde(skip)]
    generation: u64,
    #[serde(skip)]
    render_mode: RenderMode,
}

impl ChatView {
    pub fn new(render_mode: RenderMode) -> Self {
        Self {
            messages: Vec::new(),
            pages: HashMap::new(),
            expanded: HashMap::new(),
            generation: 0,
            render_mode,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Hay una consulta sin respuesta para la generación actual.
    pub fn is_waiting(&self) -> bool {
        matches!(self.messages.last(), Some(last) if last.is_user)
    }

    /// Registra un nuevo mensaje del usuario. Texto vacío (tras `trim`) no hace nada.
    pub fn send(&mut self, text: &str) -> Option<PendingQuery> {
        let query = text.trim();
        if query.is_empty() {
            return None;
        }

        self.generation += 1;
        self.messages = vec![Message::user(query)];
        debug!("Nueva consulta (generación {}): {}", self.generation, query);

        Some(PendingQuery {
            generation: self.generation,
            query: query.to_string(),
        })
    }

    /// Añade la respuesta del bot. Devuelve `false` si la consulta ya no es la
    /// vigente y la respuesta se ha descartado.
    pub fn resolve(
        &mut self,
        pending: PendingQuery,
        reply: Result<RetrievalOutcome, RetrievalError>,
    ) -> bool {
        if pending.generation != self.generation || !self.is_waiting() {
            debug!(
                "Respuesta descartada: generación {} (vigente {})",
                pending.generation, self.generation
            );
            return false;
        }

        let bot = self.bot_message(reply);
        info!("Respuesta añadida para la consulta '{}'", pending.query);
        self.messages.push(bot);
        true
    }

    fn bot_message(&self, reply: Result<RetrievalOutcome, RetrievalError>) -> Message {
        match reply {
            Err(err) => {
                error!("Error: {}", err);
                Message::bot_text(ERROR_TEXT)
            }
            Ok(RetrievalOutcome::Empty(text)) => Message::bot_text(text),
            Ok(RetrievalOutcome::Results(items)) => match self.render_mode {
                RenderMode::Cards => Message::bot_results(items),
                RenderMode::Combined => Message::bot_html(render::render_combined(&items)),
            },
        }
    }

    fn find_message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Página actual (1-indexada) de un mensaje con resultados.
    pub fn current_page(&self, message_id: &str) -> usize {
        let total = self
            .find_message(message_id)
            .and_then(Message::total_pages)
            .unwrap_or(1);
        self.pages
            .get(message_id)
            .copied()
            .unwrap_or(1)
            .clamp(1, total.max(1))
    }

    /// Cambia de página, limitando al rango `[1, total_pages]`. `None` si el
    /// mensaje no existe o no tiene resultados.
    pub fn set_page(&mut self, message_id: &str, page: usize) -> Option<usize> {
        let total = self.find_message(message_id)?.total_pages()?;
        let page = page.clamp(1, total.max(1));
        self.pages.insert(message_id.to_string(), page);
        Some(page)
    }

    pub fn next_page(&mut self, message_id: &str) -> Option<usize> {
        let page = self.current_page(message_id);
        self.set_page(message_id, page + 1)
    }

    pub fn prev_page(&mut self, message_id: &str) -> Option<usize> {
        let page = self.current_page(message_id);
        self.set_page(message_id, page.saturating_sub(1))
    }

    /// Resultados visibles en la página actual del mensaje.
    pub fn page_items(&self, message_id: &str) -> &[ResultItem] {
        let Some(Message {
            content: MessageContent::Results { results, .. },
            ..
        }) = self.find_message(message_id)
        else {
            return &[];
        };
        let start = (self.current_page(message_id) - 1) * PAGE_SIZE;
        let end = (start + PAGE_SIZE).min(results.len());
        results.get(start..end).unwrap_or(&[])
    }

    /// Id del mensaje que contiene el resultado.
    pub fn item_message_id(&self, item_id: &str) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| match &m.content {
                MessageContent::Results { results, .. } => results.iter().any(|r| r.id == item_id),
                _ => false,
            })
            .map(|m| m.id.as_str())
    }

    pub fn is_expanded(&self, item_id: &str) -> bool {
        self.expanded.get(item_id).copied().unwrap_or(false)
    }

    /// Alterna la descripción completa de un resultado visible. Devuelve el
    /// nuevo estado, o `None` si no hay ningún resultado con ese id.
    pub fn toggle_expanded(&mut self, item_id: &str) -> Option<bool> {
        self.item_message_id(item_id)?;
        let flag = self.expanded.entry(item_id.to_string()).or_insert(false);
        *flag = !*flag;
        Some(*flag)
    }
}
