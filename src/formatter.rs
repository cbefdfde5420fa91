//! Convierte resultados de búsqueda en el texto de respuesta del asistente,
//! con un enlace de ruta por resultado.

use serde::Serialize;

use crate::models::{ResultLink, SearchResult};
use crate::path_links;

pub const NO_RESULTS_MESSAGE: &str =
    "No relevant materials found. Would you like to request adding new materials?";

pub const FOLLOW_UP_PROMPT: &str =
    "Would you like more information about any of these, or would you like to request new materials?";

/// Respuesta formateada: enlaces para la capa de presentación y cuerpo del mensaje.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormattedResponse {
    pub links: Vec<ResultLink>,
    pub body: String,
}

/// Un enlace por resultado, en el mismo orden de entrada.
pub fn build_result_links(results: &[SearchResult], start_node_id: &str) -> Vec<ResultLink> {
    results
        .iter()
        .map(|result| ResultLink {
            node_id: result.node.id.clone(),
            name: result.node.name.clone(),
            link: path_links::encode(start_node_id, Some(&result.node.id)),
        })
        .collect()
}

pub fn format_results(results: &[SearchResult], start_node_id: &str) -> FormattedResponse {
    if results.is_empty() {
        return FormattedResponse {
            links: Vec::new(),
            body: NO_RESULTS_MESSAGE.to_string(),
        };
    }

    let links = build_result_links(results, start_node_id);
    let bullets = links
        .iter()
        .map(|r| format!("• [{}]({})", r.name, r.link))
        .collect::<Vec<_>>()
        .join("\n");

    let body = format!(
        "I found {} relevant material(s):\n\n{}\n\n{}",
        results.len(),
        bullets,
        FOLLOW_UP_PROMPT
    );

    FormattedResponse { links, body }
}
