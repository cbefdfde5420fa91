//! Enlaces de ruta `/paths/<inicio>/<fin>` hacia la visualización D3 del grafo.
//!
//! Cada identificador se codifica por separado como componente de URI, de modo
//! que `decode(encode(a, b))` devuelve siempre `(a, b)`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::DEFAULT_START_NODE_ID;

static PATH_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/paths/([^/]+)/([^/]+)$").expect("regex de enlaces de ruta"));

/// Par de nodos (inicio, fin) extraído de un enlace de ruta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathLink {
    pub start_id: String,
    pub end_id: String,
}

/// Construye un enlace de ruta. Si sólo se da un nodo, el inicio es "E"
/// y el nodo dado pasa a ser el destino.
pub fn encode(start_id: &str, end_id: Option<&str>) -> String {
    match end_id {
        Some(end_id) => format!(
            "/paths/{}/{}",
            urlencoding::encode(start_id),
            urlencoding::encode(end_id)
        ),
        None => format!(
            "/paths/{}/{}",
            DEFAULT_START_NODE_ID,
            urlencoding::encode(start_id)
        ),
    }
}

/// Inversa de [`encode`]. `None` significa "no es un enlace de ruta".
pub fn decode(path: &str) -> Option<PathLink> {
    let caps = PATH_LINK_RE.captures(path)?;
    let start_id = urlencoding::decode(&caps[1]).ok()?.into_owned();
    let end_id = urlencoding::decode(&caps[2]).ok()?.into_owned();
    Some(PathLink { start_id, end_id })
}
