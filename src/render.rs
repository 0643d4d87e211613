//! Renderizado HTML de la vista de chat (servidor).
//!
//! Las plantillas askama escapan todo lo que reciben; sólo el texto ya
//! escapado y enlazado de `format_text_with_links` y los fragmentos que
//! producen otras plantillas entran como marcado seguro.

use std::sync::LazyLock;

use askama::Html as HtmlEscaper;
use askama::{MarkupDisplay, Template};
use regex::Regex;
use tracing::error;

use crate::chat::ChatView;
use crate::models::{Message, MessageContent, ResultItem};

type SafeMarkup = MarkupDisplay<HtmlEscaper, String>;

pub const PAGE_TITLE: &str = "Chat Patrimonio Universidad de Valencia";

/// Caracteres de descripción que se muestran antes de "Ver más".
pub const DESCRIPTION_LIMIT: usize = 100;

pub const COLLECTION_LINK: &str = "https://colecciones.uv.es/s/patrimonio-artistico-es/page/welcome";
pub const PLACEHOLDER_IMAGE: &str =
    "https://colecciones.uv.es/files/original/ced7a5b304d827c31b4f31fab070763a43abf827.jpg";

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

pub fn escape_html(s: &str) -> String {
    MarkupDisplay::new_unsafe(s, HtmlEscaper).to_string()
}

/// Escapa el texto y convierte las URLs `http(s)://` en enlaces.
pub fn format_text_with_links(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let escaped = escape_html(text);
    URL_RE
        .replace_all(
            &escaped,
            r#"<a href="$0" target="_blank" rel="noopener noreferrer" class="message-link">$0</a>"#,
        )
        .into_owned()
}

/// Sólo se enlazan URLs http(s); cualquier otra cosa se ignora.
fn safe_url(url: &str) -> Option<&str> {
    let url = url.trim();
    (url.starts_with("http://") || url.starts_with("https://")).then_some(url)
}

/// Recorta la descripción a `limit` caracteres. Devuelve el texto a mostrar y
/// si hacía falta recortar.
pub fn truncate_description(description: &str, limit: usize) -> (String, bool) {
    if description.chars().count() <= limit {
        return (description.to_string(), false);
    }
    let mut cut: String = description.chars().take(limit).collect();
    cut.push_str("...");
    (cut, true)
}

fn render_template<T: Template>(template: &T) -> String {
    template.render().unwrap_or_else(|err| {
        error!("Error al renderizar la plantilla: {}", err);
        String::new()
    })
}

#[derive(Template)]
#[template(
    source = r#"{% for item in items %}{% if !loop.first %}<hr class="item-sep"/>{% endif %}<div class="result-item-html">{{ loop.index }}. {{ item.titulo }}{% if !item.ubicacion.is_empty() %}<br/>📍Ubicación: {{ item.ubicacion }}{% endif %}{% if !item.autor.is_empty() %}<br/>✍️Autor: {{ item.autor }}{% endif %}{% if !item.descripcion.is_empty() %}<br/>📝Descripción: {{ item.descripcion }}{% endif %}<div class="result-link-html">🔗 Ver más: <a href="{{ collection_link }}" target="_blank" rel="noopener noreferrer" class="message-link">Colección</a></div><div class="item-image"> <img src="{{ placeholder_image }}" onerror="this.style.display='none'" alt="imagen"/> </div></div>{% endfor %}"#,
    ext = "html"
)]
struct CombinedTemplate<'a> {
    items: &'a [ResultItem],
    collection_link: &'static str,
    placeholder_image: &'static str,
}

/// Modo combinado: todos los resultados en un único bloque HTML.
pub fn render_combined(items: &[ResultItem]) -> String {
    render_template(&CombinedTemplate {
        items,
        collection_link: COLLECTION_LINK,
        placeholder_image: PLACEHOLDER_IMAGE,
    })
}

struct MetaLine<'a> {
    label: &'static str,
    value: &'a str,
}

#[derive(Template)]
#[template(
    source = r#"<article class="result-card">{% match image %}{% when Some with (src) %}<div class="card-image"><img src="{{ src }}" alt="{{ title }}" loading="lazy" onerror="this.style.display='none'"/></div>{% when None %}{% endmatch %}<h3 class="card-title">{{ title }}</h3>{% for line in meta %}<p class="card-meta"><strong>{{ line.label }}:</strong> {{ line.value }}</p>{% endfor %}{% match description %}{% when Some with (text) %}<p class="card-description">{{ text }}</p>{% when None %}{% endmatch %}{% match toggle_label %}{% when Some with (label) %}<form method="post" action="/items/toggle" class="toggle-form"><input type="hidden" name="item_id" value="{{ item_id }}"/><button type="submit" class="toggle-button">{{ label }}</button></form>{% when None %}{% endmatch %}{% match link %}{% when Some with (href) %}<a href="{{ href }}" target="_blank" rel="noopener noreferrer" class="card-link">🔗 Ver en la colección</a>{% when None %}{% endmatch %}</article>"#,
    ext = "html"
)]
struct CardTemplate<'a> {
    item_id: &'a str,
    title: &'a str,
    image: Option<&'a str>,
    meta: Vec<MetaLine<'a>>,
    description: Option<String>,
    toggle_label: Option<&'static str>,
    link: Option<&'a str>,
}

/// Tarjeta de un resultado. La descripción larga se recorta salvo que esté expandida.
pub fn render_card(item: &ResultItem, expanded: bool) -> String {
    let meta = [
        ("✍️ Autor", item.autor.as_str()),
        ("🏛️ Colección", item.coleccion.as_str()),
        ("📍 Ubicación", item.ubicacion.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| MetaLine { label, value })
    .collect();

    let (description, toggle_label) = if item.descripcion.is_empty() {
        (None, None)
    } else {
        let (short, truncated) = truncate_description(&item.descripcion, DESCRIPTION_LIMIT);
        match (truncated, expanded) {
            (false, _) => (Some(short), None),
            (true, false) => (Some(short), Some("Ver más")),
            (true, true) => (Some(item.descripcion.clone()), Some("Ver menos")),
        }
    };

    render_template(&CardTemplate {
        item_id: &item.id,
        title: &item.titulo,
        image: safe_url(&item.imagen),
        meta,
        description,
        toggle_label,
        link: safe_url(&item.link),
    })
}

#[derive(Template)]
#[template(
    source = r#"<div class="results-grid">{% for card in cards %}{{ card|safe }}{% endfor %}</div><nav class="pagination"><form method="post" action="{{ action }}"><input type="hidden" name="page" value="{{ prev }}"/><button type="submit" class="page-button page-prev"{% if prev_disabled %} disabled{% endif %}>← Anterior</button></form><span class="page-info">Página {{ page }} de {{ total_pages }} · {{ total_registros }} resultados</span><form method="post" action="{{ action }}"><input type="hidden" name="page" value="{{ next }}"/><button type="submit" class="page-button page-next"{% if next_disabled %} disabled{% endif %}>Siguiente →</button></form></nav>"#,
    ext = "html"
)]
struct ResultsTemplate {
    cards: Vec<String>,
    action: String,
    page: usize,
    total_pages: usize,
    total_registros: usize,
    prev: usize,
    next: usize,
    prev_disabled: bool,
    next_disabled: bool,
}

/// Página actual de tarjetas de un mensaje más los controles de paginación.
pub fn render_results(view: &ChatView, message: &Message, total_registros: usize, total_pages: usize) -> String {
    let page = view.current_page(&message.id);
    let cards = view
        .page_items(&message.id)
        .iter()
        .map(|item| render_card(item, view.is_expanded(&item.id)))
        .collect();

    render_template(&ResultsTemplate {
        cards,
        action: format!("/messages/{}/page", message.id),
        page,
        total_pages,
        total_registros,
        prev: page.saturating_sub(1).max(1),
        next: (page + 1).min(total_pages.max(1)),
        prev_disabled: page <= 1,
        next_disabled: page >= total_pages,
    })
}

enum MessageBody {
    Text(SafeMarkup),
    Html(SafeMarkup),
    Results(SafeMarkup),
}

#[derive(Template)]
#[template(
    source = r#"<div id="msg-{{ id }}" class="message-wrapper {{ side }}"><div class="message-bubble {{ side }}">{% match body %}{% when MessageBody::Text with (text) %}<p>{{ text|safe }}</p>{% when MessageBody::Html with (html) %}<div>{{ html|safe }}</div>{% when MessageBody::Results with (results) %}{{ results|safe }}{% endmatch %}</div></div>"#,
    ext = "html"
)]
struct MessageTemplate<'a> {
    id: &'a str,
    side: &'static str,
    body: MessageBody,
}

pub fn render_message(view: &ChatView, message: &Message) -> String {
    let body = match &message.content {
        MessageContent::Text { text } => {
            MessageBody::Text(MarkupDisplay::new_safe(format_text_with_links(text), HtmlEscaper))
        }
        MessageContent::Html { html } => {
            MessageBody::Html(MarkupDisplay::new_safe(html.clone(), HtmlEscaper))
        }
        MessageContent::Results {
            total_registros,
            total_pages,
            ..
        } => MessageBody::Results(MarkupDisplay::new_safe(
            render_results(view, message, *total_registros, *total_pages),
            HtmlEscaper,
        )),
    };
    render_template(&MessageTemplate {
        id: &message.id,
        side: if message.is_user { "user" } else { "bot" },
        body,
    })
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{{ title }}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<div class="app-container">
<header class="site-header"><div class="header-content"><h1 class="header-title">{{ title }}</h1></div></header>
<main class="messages-area"><div class="messages-container"><div class="messages-list">
{% for message in messages %}{{ message|safe }}
{% endfor %}{% if waiting %}<div class="message-wrapper bot"><div class="message-bubble bot pending"><p>…</p></div></div>
{% endif %}</div></div></main>
<div class="input-area"><div class="input-container">
<form method="post" action="/chat" class="input-wrapper">
<textarea id="chat-input" name="text" class="chat-input" placeholder="Escribe tu pregunta aquí..." rows="1"></textarea>
<button id="send-button" type="submit" class="send-button" aria-label="Enviar">
<svg class="send-icon" fill="none" stroke="currentColor" viewBox="0 0 24 24"><path stroke-linecap="round" stroke-linejoin="round" stroke-width="2" d="M12 19l9 2-9-18-9 18 9-2zm0 0v-8"/></svg>
</button>
</form>
</div></div>
</div>
<script>
(() => {
  const input = document.getElementById('chat-input');
  const button = document.getElementById('send-button');
  const sync = () => { button.disabled = input.value.trim() === ''; };
  input.addEventListener('input', sync);
  input.addEventListener('keydown', (e) => {
    if (e.key === 'Enter' && !e.shiftKey) {
      e.preventDefault();
      if (input.value.trim() !== '') input.form.submit();
    }
  });
  sync();
  input.focus();
})();
</script>
</body>
</html>
"#,
    ext = "html"
)]
struct ChatPageTemplate {
    title: &'static str,
    messages: Vec<String>,
    waiting: bool,
}

/// Documento completo de la página de chat.
pub fn render_page(view: &ChatView) -> String {
    let messages = view
        .messages()
        .iter()
        .map(|message| render_message(view, message))
        .collect();
    render_template(&ChatPageTemplate {
        title: PAGE_TITLE,
        messages,
        waiting: view.is_waiting(),
    })
}
