//! Vistas de chat por navegador, identificadas con una cookie de sesión.
//!
//! Cada navegador tiene su propia conversación. Las sesiones caducan tras
//! `session_ttl` sin uso y, si se alcanza `max_sessions`, se expulsa la que
//! lleva más tiempo sin actividad.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use cookie::{Cookie, SameSite};
use tracing::debug;
use uuid::Uuid;

use crate::chat::ChatView;
use crate::config::{AppConfig, RenderMode};

pub const SESSION_COOKIE: &str = "patrimonio_session";

struct SessionEntry {
    view: ChatView,
    last_seen: Instant,
}

/// Sesión resuelta para una petición.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    pub id: String,
    /// La sesión se acaba de crear y hay que enviar la cookie.
    pub is_new: bool,
}

impl ChatSession {
    /// Valor de `Set-Cookie` para una sesión nueva.
    pub fn set_cookie(&self) -> Option<String> {
        self.is_new.then(|| {
            Cookie::build((SESSION_COOKIE, self.id.clone()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build()
                .to_string()
        })
    }
}

/// Id de sesión enviado por el navegador, si lo hay.
pub fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

pub struct SessionStore {
    entries: Mutex<HashMap<String, SessionEntry>>,
    render_mode: RenderMode,
    max_sessions: usize,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(render_mode: RenderMode, max_sessions: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            render_mode,
            max_sessions: max_sessions.max(1),
            ttl,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.render_mode, cfg.max_sessions, cfg.session_ttl)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Devuelve la sesión de la cookie si sigue viva; si no, abre una nueva.
    /// Los ids que no emitió este servidor no se aceptan.
    pub fn resolve(&self, requested: Option<&str>) -> ChatSession {
        let now = Instant::now();
        let mut entries = self.lock();

        if let Some(id) = requested {
            if let Some(entry) = entries.get_mut(id) {
                if now.duration_since(entry.last_seen) < self.ttl {
                    entry.last_seen = now;
                    return ChatSession {
                        id: id.to_string(),
                        is_new: false,
                    };
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        self.insert(&mut entries, id.clone(), now);
        debug!("Nueva sesión de chat {} ({} activas)", id, entries.len());
        ChatSession { id, is_new: true }
    }

    /// Ejecuta `f` sobre la vista de la sesión. Una sesión expulsada mientras
    /// tanto se recrea vacía.
    pub fn with_view<R>(&self, session_id: &str, f: impl FnOnce(&mut ChatView) -> R) -> R {
        let now = Instant::now();
        let mut entries = self.lock();
        if !entries.contains_key(session_id) {
            self.insert(&mut entries, session_id.to_string(), now);
        }
        let entry = entries
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                view: ChatView::new(self.render_mode),
                last_seen: now,
            });
        entry.last_seen = now;
        f(&mut entry.view)
    }

    /// Alguna sesión tiene una consulta sin responder.
    pub fn any_waiting(&self) -> bool {
        self.lock().values().any(|entry| entry.view.is_waiting())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn insert(&self, entries: &mut HashMap<String, SessionEntry>, id: String, now: Instant) {
        entries.retain(|_, entry| now.duration_since(entry.last_seen) < self.ttl);
        while entries.len() >= self.max_sessions {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => {
                    debug!("Sesión {} expulsada por capacidad", oldest);
                    entries.remove(&oldest);
                }
                None => break,
            }
        }
        entries.insert(
            id,
            SessionEntry {
                view: ChatView::new(self.render_mode),
                last_seen: now,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn store(max_sessions: usize) -> SessionStore {
        SessionStore::new(RenderMode::Cards, max_sessions, Duration::from_secs(60))
    }

    #[test]
    fn known_ids_are_reused_and_unknown_ones_replaced() {
        let store = store(10);
        let first = store.resolve(None);
        assert!(first.is_new);
        assert!(first.set_cookie().is_some());

        let again = store.resolve(Some(&first.id));
        assert_eq!(again.id, first.id);
        assert!(!again.is_new);
        assert_eq!(again.set_cookie(), None);

        let forged = store.resolve(Some("inventado"));
        assert!(forged.is_new);
        assert_ne!(forged.id, "inventado");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn views_are_isolated_per_session() {
        let store = store(10);
        let a = store.resolve(None);
        let b = store.resolve(None);

        store.with_view(&a.id, |view| view.send("retrato"));
        assert_eq!(store.with_view(&a.id, |view| view.messages().len()), 1);
        assert!(store.with_view(&b.id, |view| view.messages().is_empty()));
        assert!(store.any_waiting());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store = store(2);
        let a = store.resolve(None);
        std::thread::sleep(Duration::from_millis(2));
        let b = store.resolve(None);
        std::thread::sleep(Duration::from_millis(2));
        // `a` se usa de nuevo, así que la más antigua pasa a ser `b`.
        store.with_view(&a.id, |view| view.send("hola"));
        std::thread::sleep(Duration::from_millis(2));

        let c = store.resolve(None);
        assert_eq!(store.len(), 2);
        assert!(!store.resolve(Some(&a.id)).is_new);
        assert!(!store.resolve(Some(&c.id)).is_new);
        assert!(store.resolve(Some(&b.id)).is_new);
    }

    #[test]
    fn expired_sessions_are_not_resumed() {
        let store = SessionStore::new(RenderMode::Cards, 10, Duration::ZERO);
        let a = store.resolve(None);
        let resumed = store.resolve(Some(&a.id));
        assert!(resumed.is_new);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reads_session_from_cookie_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id_from(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("tema=oscuro; patrimonio_session=abc-123"),
        );
        assert_eq!(session_id_from(&headers).as_deref(), Some("abc-123"));

        let cookie = ChatSession {
            id: "abc-123".to_string(),
            is_new: true,
        }
        .set_cookie()
        .unwrap();
        assert!(cookie.starts_with("patrimonio_session=abc-123"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
    }
}
