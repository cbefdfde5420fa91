//! Orquestación de una sesión de chat.
//!
//! Flujo de mensaje:
//!   1. Se añade el mensaje del usuario.
//!   2. Búsqueda por similitud en la Perk API.
//!   3. Se formatea la respuesta con enlaces de ruta y se añade como mensaje
//!      del asistente.
//!
//! Flujo de solicitud de material: último mensaje del usuario + resultados
//! actuales → Perk API → mensaje de confirmación.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    config::ChatSettings,
    formatter::{self, FormattedResponse},
    models::{ChatMessage, MaterialRequest, MessageMetadata, Role, SearchResult},
    perk_client::ChatBackend,
    session::{generate_message_id, generate_session_id},
};

pub const WELCOME_MESSAGE: &str = "Hi! I'm the WBP Chatbot. I can help you search for learning materials or recommend new resources to add to the Web Brain Project. What would you like to explore?";

pub const THANK_YOU_MESSAGE: &str =
    "Thank you for your request! The admin team will review it shortly.";

/// Resultado de enviar un mensaje: la respuesta del asistente y lo que la generó.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: ChatMessage,
    pub formatted: FormattedResponse,
    pub results: Vec<SearchResult>,
}

/// Estado de una conversación. Sólo se modifica a través de sus métodos;
/// los mensajes nunca se editan ni se reordenan.
#[derive(Debug)]
pub struct ChatSession {
    session_id: String,
    settings: ChatSettings,
    messages: Vec<ChatMessage>,
    current_results: Vec<SearchResult>,
    show_results: bool,
    last_error: Option<String>,
}

impl ChatSession {
    pub fn new(settings: ChatSettings) -> Self {
        let session_id = generate_session_id();
        let mut session = Self {
            session_id,
            settings,
            messages: Vec::new(),
            current_results: Vec::new(),
            show_results: false,
            last_error: None,
        };
        session.push_welcome();
        session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn current_results(&self) -> &[SearchResult] {
        &self.current_results
    }

    pub fn results_visible(&self) -> bool {
        self.show_results
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Prompt de sistema con las instrucciones personalizadas, si las hay.
    pub fn full_system_prompt(&self) -> String {
        match self.settings.custom_instructions.as_deref() {
            Some(extra) if !extra.is_empty() => format!(
                "{}\n\nAdditional Instructions:\n{}",
                self.settings.system_prompt, extra
            ),
            _ => self.settings.system_prompt.clone(),
        }
    }

    pub fn set_custom_instructions(&mut self, instructions: impl Into<String>) {
        let instructions = instructions.into();
        self.settings.custom_instructions = if instructions.is_empty() {
            None
        } else {
            Some(instructions)
        };
    }

    /// Envía un mensaje del usuario. Devuelve `Ok(None)` si el texto está en blanco.
    pub async fn send_message(
        &mut self,
        backend: &dyn ChatBackend,
        text: &str,
    ) -> Result<Option<ChatReply>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let metadata = MessageMetadata {
            session_id: Some(self.session_id.clone()),
            related_node_ids: None,
        };
        self.push(Role::User, text.to_string(), Some(metadata));
        self.last_error = None;

        let results = match backend
            .search_by_similarity(text, self.settings.search_limit)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("Error procesando el mensaje de la sesión {}: {e}", self.session_id);
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        self.current_results = results.clone();
        self.show_results = true;

        let formatted = formatter::format_results(&results, &self.settings.start_node_id);
        let metadata = MessageMetadata {
            session_id: Some(self.session_id.clone()),
            related_node_ids: Some(results.iter().map(|r| r.node.id.clone()).collect()),
        };
        let message = self.push(Role::Assistant, formatted.body.clone(), Some(metadata));

        Ok(Some(ChatReply {
            message,
            formatted,
            results,
        }))
    }

    /// Envía una solicitud de material con el último mensaje del usuario y los
    /// resultados actuales. La identificación sólo se incluye con consentimiento.
    pub async fn submit_material_request(
        &mut self,
        backend: &dyn ChatBackend,
        consent: bool,
        user_identification: Option<String>,
    ) -> Result<ChatMessage> {
        let request = self.build_material_request(consent, user_identification);

        if let Err(e) = backend.submit_material_request(&request).await {
            warn!("Error enviando la solicitud de material de {}: {e}", self.session_id);
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        info!("Solicitud de material enviada (sesión {}).", self.session_id);
        self.show_results = false;
        self.last_error = None;
        Ok(self.push(Role::Assistant, THANK_YOU_MESSAGE.to_string(), None))
    }

    pub fn build_material_request(
        &self,
        consent: bool,
        user_identification: Option<String>,
    ) -> MaterialRequest {
        let user_intent = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        MaterialRequest {
            user_intent,
            suggested_materials: self.current_results.clone(),
            user_identification: if consent { user_identification } else { None },
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Vacía la conversación y vuelve a mostrar el saludo.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.current_results.clear();
        self.show_results = false;
        self.last_error = None;
        self.push_welcome();
    }

    fn push_welcome(&mut self) {
        let metadata = MessageMetadata {
            session_id: Some(self.session_id.clone()),
            related_node_ids: None,
        };
        self.push(Role::Assistant, WELCOME_MESSAGE.to_string(), Some(metadata));
    }

    fn push(&mut self, role: Role, content: String, metadata: Option<MessageMetadata>) -> ChatMessage {
        let message = ChatMessage {
            id: generate_message_id(),
            role,
            content,
            timestamp: Utc::now(),
            metadata,
        };
        self.messages.push(message.clone());
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use crate::models::MaterialRequestAck;

    #[derive(Default)]
    struct MockBackend {
        results: Vec<SearchResult>,
        fail: bool,
        searches: Mutex<Vec<(String, usize)>>,
        requests: Mutex<Vec<MaterialRequest>>,
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        async fn search_by_similarity(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
            self.searches.lock().unwrap().push((query.to_string(), limit));
            if self.fail {
                return Err(anyhow!("Network Error"));
            }
            Ok(self.results.clone())
        }

        async fn submit_material_request(&self, request: &MaterialRequest) -> Result<MaterialRequestAck> {
            if self.fail {
                return Err(anyhow!("Network Error"));
            }
            self.requests.lock().unwrap().push(request.clone());
            Ok(MaterialRequestAck { success: true })
        }
    }

    fn backend_with_results() -> MockBackend {
        MockBackend {
            results: vec![
                SearchResult::new("X", "JavaScript Basics", 0.95),
                SearchResult::new("Y", "React Fundamentals", 0.87),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn new_session_starts_with_welcome() {
        let session = ChatSession::new(ChatSettings::default());
        assert!(session.session_id().starts_with("session_"));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::Assistant);
        assert_eq!(session.messages()[0].content, WELCOME_MESSAGE);
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let backend = backend_with_results();
        let mut session = ChatSession::new(ChatSettings::default());
        let reply = assert_ok!(session.send_message(&backend, "   ").await);
        assert!(reply.is_none());
        assert_eq!(session.messages().len(), 1);
        assert!(backend.searches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_flow_appends_user_and_assistant() {
        let backend = backend_with_results();
        let mut session = ChatSession::new(ChatSettings::default());

        let reply = assert_ok!(session.send_message(&backend, "javascript").await).unwrap();

        assert_eq!(*backend.searches.lock().unwrap(), vec![("javascript".to_string(), 10)]);
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[1].role, Role::User);
        assert_eq!(session.messages()[2], reply.message);
        assert!(reply.message.content.contains("• [JavaScript Basics](/paths/E/X)"));
        assert_eq!(
            reply.message.metadata.as_ref().unwrap().related_node_ids,
            Some(vec!["X".to_string(), "Y".to_string()])
        );
        assert_eq!(session.current_results().len(), 2);
        assert!(session.results_visible());
    }

    #[tokio::test]
    async fn configured_start_node_and_limit_are_used() {
        let backend = backend_with_results();
        let settings = ChatSettings {
            start_node_id: "root skill".to_string(),
            search_limit: 3,
            ..Default::default()
        };
        let mut session = ChatSession::new(settings);
        let reply = session.send_message(&backend, "react").await.unwrap().unwrap();
        assert_eq!(reply.formatted.links[0].link, "/paths/root%20skill/X");
        assert_eq!(backend.searches.lock().unwrap()[0].1, 3);
    }

    #[tokio::test]
    async fn search_failure_records_error_and_keeps_user_message() {
        let backend = MockBackend {
            fail: true,
            ..Default::default()
        };
        let mut session = ChatSession::new(ChatSettings::default());
        assert_err!(session.send_message(&backend, "rust").await);
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.last_error(), Some("Network Error"));
    }

    #[tokio::test]
    async fn material_request_uses_last_user_message_and_results() {
        let backend = backend_with_results();
        let mut session = ChatSession::new(ChatSettings::default());
        session.send_message(&backend, "first").await.unwrap();
        session.send_message(&backend, "add a React tutorial").await.unwrap();

        let confirmation = assert_ok!(
            session
                .submit_material_request(&backend, true, Some("ana".to_string()))
                .await
        );
        assert_eq!(confirmation.content, THANK_YOU_MESSAGE);
        assert!(!session.results_visible());

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].user_intent, "add a React tutorial");
        assert_eq!(requests[0].suggested_materials.len(), 2);
        assert_eq!(requests[0].user_identification.as_deref(), Some("ana"));
        assert_eq!(requests[0].session_id, session.session_id());
    }

    #[test]
    fn identification_requires_consent() {
        let session = ChatSession::new(ChatSettings::default());
        let request = session.build_material_request(false, Some("ana".to_string()));
        assert!(request.user_identification.is_none());
        assert_eq!(request.user_intent, "");
    }

    #[tokio::test]
    async fn failed_material_request_appends_nothing() {
        let backend = MockBackend {
            fail: true,
            ..Default::default()
        };
        let mut session = ChatSession::new(ChatSettings::default());
        assert_err!(session.submit_material_request(&backend, false, None).await);
        assert_eq!(session.messages().len(), 1);
        assert!(session.last_error().is_some());
    }

    #[test]
    fn system_prompt_includes_custom_instructions() {
        let mut session = ChatSession::new(ChatSettings {
            system_prompt: "Base".to_string(),
            ..Default::default()
        });
        assert_eq!(session.full_system_prompt(), "Base");
        session.set_custom_instructions("Prefer videos");
        assert_eq!(
            session.full_system_prompt(),
            "Base\n\nAdditional Instructions:\nPrefer videos"
        );
        session.set_custom_instructions("");
        assert_eq!(session.full_system_prompt(), "Base");
    }

    #[tokio::test]
    async fn clear_resets_to_welcome() {
        let backend = backend_with_results();
        let mut session = ChatSession::new(ChatSettings::default());
        session.send_message(&backend, "javascript").await.unwrap();
        session.clear();
        assert_eq!(session.messages().len(), 1);
        assert!(session.current_results().is_empty());
        assert!(!session.results_visible());
    }
}
