//! Modelos de dominio (nodos del grafo WBP, resultados de búsqueda, mensajes
//! de chat y solicitudes de material).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Un nodo del grafo de conocimiento: una habilidad (skill) o un recurso URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    IsPrerequisiteTo,
    Teaches,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    pub source: String,
    pub target: String,
}

/// Resultado de la búsqueda por similitud. `similarity` suele estar en
/// [0, 1] pero no se valida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub node: GraphNode,
    pub similarity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_nodes: Option<Vec<Relationship>>,
}

#[cfg(test)]
impl SearchResult {
    pub fn new(id: impl Into<String>, name: impl Into<String>, similarity: f64) -> Self {
        Self {
            node: GraphNode {
                id: id.into(),
                name: name.into(),
                embedding: None,
            },
            similarity,
            related_nodes: None,
        }
    }
}

/// Enlace clicable de un resultado hacia la visualización de rutas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultLink {
    pub node_id: String,
    pub name: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_node_ids: Option<Vec<String>>,
}

/// Mensaje de la conversación. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Solicitud de nuevo material que se reenvía al canal de revisión.
/// No se persiste localmente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRequest {
    pub user_intent: String,
    pub suggested_materials: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identification: Option<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Respuesta del endpoint de solicitudes de material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequestAck {
    pub success: bool,
}

// --- Payload de notificación (embed de Discord) ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordEmbedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}
