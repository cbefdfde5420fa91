//! Utilidades de sesión: identificadores, fechas y validación de ids de nodo.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Genera un identificador único de sesión con la forma
/// `session_<millis>_<9 caracteres aleatorios>`.
pub fn generate_session_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

pub fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Fecha ISO-8601 con milisegundos y sufijo `Z`.
pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty()
}
