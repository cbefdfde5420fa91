//! Carga y gestión de configuración de la aplicación (Perk API + servidor del widget).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use url::Url;

/// URL por defecto de la Perk API si no se define `PERK_API_BASE_URL`.
pub const DEFAULT_PERK_API_URL: &str = "http://localhost:3000";

/// Nodo de entrada ("E") usado como inicio de los enlaces de ruta.
pub const DEFAULT_START_NODE_ID: &str = "E";

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Sesiones inactivas más tiempo que esto se eliminan del registro.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

pub const DEFAULT_MAX_SESSIONS: usize = 1000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for the Web Brain Project Search Page. Assist users in searching for URLs or skills, and assist them in adding new material if the material they are looking for does not exist yet.";

/// Parámetros de cada sesión de chat. Se copian en cada `ChatSession`
/// en lugar de leerse de estado global.
#[derive(Clone, Debug)]
pub struct ChatSettings {
    pub start_node_id: String,
    pub search_limit: usize,
    pub system_prompt: String,
    pub custom_instructions: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            start_node_id: DEFAULT_START_NODE_ID.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            custom_instructions: None,
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub perk_api_url: Url,
    pub server_addr: String,
    pub request_timeout: Duration,
    pub open_browser: bool,
    pub session_idle_timeout: Duration,
    pub max_sessions: usize,
    pub chat: ChatSettings,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let perk_api_url = parse_base_url(
            &env::var("PERK_API_BASE_URL").unwrap_or_else(|_| DEFAULT_PERK_API_URL.to_string()),
        )?;

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let request_timeout = match env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .map_err(|_| anyhow!("REQUEST_TIMEOUT_SECS no es un número válido: {raw}"))?,
            ),
            Err(_) => Duration::from_secs(30),
        };

        let open_browser = env::var("OPEN_BROWSER")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);

        let session_idle_timeout = match env::var("SESSION_IDLE_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| {
                anyhow!("SESSION_IDLE_TIMEOUT_SECS no es un número válido: {raw}")
            })?),
            Err(_) => Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        };

        let max_sessions = match env::var("MAX_SESSIONS") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("MAX_SESSIONS debe ser un entero positivo: {raw}"))?,
            Err(_) => DEFAULT_MAX_SESSIONS,
        };

        let start_node_id =
            env::var("START_NODE_ID").unwrap_or_else(|_| DEFAULT_START_NODE_ID.to_string());

        let search_limit = match env::var("SEARCH_LIMIT") {
            Ok(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("SEARCH_LIMIT debe ser un entero positivo: {raw}"))?,
            Err(_) => DEFAULT_SEARCH_LIMIT,
        };

        let system_prompt =
            env::var("SYSTEM_PROMPT").unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());

        // Sustituye a la subida de fichero de instrucciones del widget original.
        let custom_instructions = match env::var("CUSTOM_INSTRUCTIONS_FILE") {
            Ok(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    anyhow!("No se pudo leer CUSTOM_INSTRUCTIONS_FILE {}: {e}", path.display())
                })?;
                Some(text)
            }
            Err(_) => None,
        };

        Ok(Self {
            perk_api_url,
            server_addr,
            request_timeout,
            open_browser,
            session_idle_timeout,
            max_sessions,
            chat: ChatSettings {
                start_node_id,
                search_limit,
                system_prompt,
                custom_instructions,
            },
        })
    }
}

/// Valida la URL base de la Perk API (sólo http/https).
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| anyhow!("URL de la Perk API inválida '{raw}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("Esquema no soportado para la Perk API: {other}")),
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
