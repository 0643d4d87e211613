//! Normalización de las respuestas del servicio de recuperación.
//!
//! Los registros que devuelve el servicio no tienen un esquema fijo: los campos
//! pueden venir en español o en inglés (`titulo`/`title`), el autor puede ser
//! una lista, una lista codificada como JSON dentro de un string o un string
//! plano, y casi todo el texto llega con entidades HTML. Aquí se convierte
//! cada registro en un `ResultItem` de texto plano.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::HtmlDecoder;
use crate::models::ResultItem;

pub const DEFAULT_TITLE: &str = "Sin título";
pub const NO_RESULTS_TEXT: &str = "No se encontraron resultados.";

const RESULTS_FIELDS: &[&str] = &["results", "resultados"];
const ANSWER_FIELDS: &[&str] = &["respuesta", "resultado"];

const ID_FIELDS: &[&str] = &["id", "identificador"];
const TITLE_FIELDS: &[&str] = &["titulo", "title"];
const LOCATION_FIELDS: &[&str] = &["ubicacion", "location"];
const AUTHOR_FIELDS: &[&str] = &["autor", "author"];
const DESCRIPTION_FIELDS: &[&str] = &["descripcion", "description"];
const LINK_FIELDS: &[&str] = &["link", "url"];
const IMAGE_FIELDS: &[&str] = &["imagen", "image"];
const COLLECTION_FIELDS: &[&str] = &["coleccion", "collection"];

/// Texto doblemente escapado (`&amp;lt;`) necesita más de una pasada; lo que
/// quede después se elimina sin decodificar.
const MAX_DECODE_PASSES: usize = 3;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z/!]|&(?:[A-Za-z]+|#[0-9]+|#x[0-9A-Fa-f]+);").unwrap());

/// Resultado de interpretar el cuerpo JSON de una respuesta correcta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Sin resultados: texto alternativo del servidor o el mensaje por defecto.
    Empty(String),
    Results(Vec<ResultItem>),
}

/// Devuelve el primer alias presente y no nulo del registro.
pub fn resolve_field<'a>(record: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| record.get(*alias).filter(|v| !v.is_null()))
}

/// Decodifica HTML a texto plano, sin etiquetas ni entidades residuales.
pub fn decode_html(input: &str, decoder: HtmlDecoder) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        if !MARKUP_RE.is_match(&current) {
            return current.trim().to_string();
        }
        let next = match decoder {
            HtmlDecoder::Dom => decode_dom(&current),
            HtmlDecoder::Basic => decode_basic(&current),
        };
        if next == current {
            return current.trim().to_string();
        }
        current = next;
    }
    // Pasadas agotadas con el texto aún cambiando: se descarta el marcado restante.
    strip_markup(&current).trim().to_string()
}

/// Elimina etiquetas y entidades sin decodificarlas. Cada vuelta quita al
/// menos dos caracteres, así que termina.
fn strip_markup(input: &str) -> String {
    let mut current = input.to_string();
    while MARKUP_RE.is_match(&current) {
        debug!("Marcado residual tras {} pasadas: {}", MAX_DECODE_PASSES, current);
        let without_tags = TAG_RE.replace_all(&current, "");
        current = MARKUP_RE.replace_all(&without_tags, "").into_owned();
    }
    current
}

fn decode_dom(input: &str) -> String {
    let fragment = Html::parse_fragment(input);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .replace('\u{a0}', " ")
}

fn decode_basic(input: &str) -> String {
    TAG_RE
        .replace_all(input, "")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Resuelve el autor a partir de sus posibles representaciones:
/// lista, lista codificada como JSON, texto plano o ausente.
pub fn resolve_author(value: Option<&Value>, decoder: HtmlDecoder) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(entries)) => join_decoded(entries, decoder),
        Some(Value::String(raw)) if raw.trim().is_empty() => String::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Vec<Value>>(raw) {
            Ok(entries) => join_decoded(&entries, decoder),
            Err(_) => decode_html(raw, decoder),
        },
        Some(other) => value_as_text(other)
            .map(|text| decode_html(&text, decoder))
            .unwrap_or_default(),
    }
}

fn join_decoded(entries: &[Value], decoder: HtmlDecoder) -> String {
    entries
        .iter()
        .filter_map(value_as_text)
        .map(|text| decode_html(&text, decoder))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Representación textual de un valor JSON escalar. Las listas se unen con `, `.
fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(entries) => Some(
            entries
                .iter()
                .filter_map(value_as_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

fn text_field(record: &Map<String, Value>, aliases: &[&str], decoder: HtmlDecoder) -> String {
    resolve_field(record, aliases)
        .and_then(value_as_text)
        .map(|text| decode_html(&text, decoder))
        .unwrap_or_default()
}

/// Convierte un registro crudo en un `ResultItem`. Nunca falla: los campos
/// ausentes o con formas inesperadas se quedan en su valor por defecto.
pub fn normalize_record(raw: &Value, decoder: HtmlDecoder) -> ResultItem {
    let empty = Map::new();
    let record = match raw {
        Value::Object(map) => map,
        other => {
            debug!("Registro de resultado con forma inesperada: {}", other);
            &empty
        }
    };

    let id = resolve_field(record, ID_FIELDS)
        .and_then(value_as_text)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let titulo = resolve_field(record, TITLE_FIELDS)
        .and_then(value_as_text)
        .map(|text| decode_html(&text, decoder))
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    ResultItem {
        id,
        titulo,
        ubicacion: text_field(record, LOCATION_FIELDS, decoder),
        autor: resolve_author(resolve_field(record, AUTHOR_FIELDS), decoder),
        descripcion: text_field(record, DESCRIPTION_FIELDS, decoder),
        link: text_field(record, LINK_FIELDS, decoder),
        imagen: text_field(record, IMAGE_FIELDS, decoder),
        coleccion: text_field(record, COLLECTION_FIELDS, decoder),
    }
}

/// Interpreta el cuerpo de una respuesta correcta del servicio.
pub fn classify_response(body: &Value, decoder: HtmlDecoder) -> RetrievalOutcome {
    let Some(data) = body.as_object() else {
        return RetrievalOutcome::Empty(NO_RESULTS_TEXT.to_string());
    };

    let records = resolve_field(data, RESULTS_FIELDS)
        .and_then(Value::as_array)
        .filter(|records| !records.is_empty());

    match records {
        Some(records) => RetrievalOutcome::Results(
            records
                .iter()
                .map(|raw| normalize_record(raw, decoder))
                .collect(),
        ),
        None => RetrievalOutcome::Empty(
            resolve_field(data, ANSWER_FIELDS)
                .and_then(value_as_text)
                .unwrap_or_else(|| NO_RESULTS_TEXT.to_string()),
        ),
    }
}
