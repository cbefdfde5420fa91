use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::info;

use crate::{chat::ChatSession, config::AppConfig, perk_client::ChatBackend};

/// Cada sesión tiene su propio mutex asíncrono: las mutaciones de una misma
/// sesión se serializan aunque crucen el `.await` de la Perk API.
pub type SharedSession = Arc<tokio::sync::Mutex<ChatSession>>;

pub struct SessionEntry {
    session: SharedSession,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub backend: Arc<dyn ChatBackend>,
    pub sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            config,
            backend,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Crea una sesión nueva con la configuración de chat por defecto.
    /// Antes de insertar barre las sesiones inactivas y, si se alcanza
    /// `max_sessions`, descarta la usada hace más tiempo.
    pub fn create_session(&self) -> (String, SharedSession) {
        let session = ChatSession::new(self.config.chat.clone());
        let id = session.session_id().to_string();
        let shared = Arc::new(tokio::sync::Mutex::new(session));
        let now = Instant::now();

        let mut sessions = self.sessions.lock().unwrap();
        self.evict_idle(&mut sessions, now);

        while sessions.len() >= self.config.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            info!("Límite de sesiones alcanzado; descartada la sesión {oldest}.");
        }

        sessions.insert(
            id.clone(),
            SessionEntry {
                session: shared.clone(),
                last_seen: now,
            },
        );
        (id, shared)
    }

    /// Busca una sesión y la marca como usada.
    pub fn session(&self, id: &str) -> Option<SharedSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub fn remove_session(&self, id: &str) -> bool {
        self.sessions.lock().unwrap().remove(id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Elimina las sesiones sin uso desde hace más de `session_idle_timeout`
    /// respecto a `now`. Devuelve cuántas se eliminaron.
    pub fn evict_idle_sessions(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        self.evict_idle(&mut sessions, now)
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, SessionEntry>, now: Instant) -> usize {
        let idle = self.config.session_idle_timeout;
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("Eliminadas {evicted} sesión(es) inactivas.");
        }
        evicted
    }
}
