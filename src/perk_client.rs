//! Cliente HTTP de la Perk API: búsqueda por similitud y solicitudes de material.
//!
//! API pública:
//!   - `PerkClient::search_by_similarity(&str, usize)`
//!   - `PerkClient::submit_material_request(&MaterialRequest)`
//!   - `build_discord_embed(&MaterialRequest, DateTime<Utc>)`

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, warn};
use url::Url;

use crate::models::{
    DiscordEmbedPayload, Embed, EmbedField, EmbedFooter, MaterialRequest, MaterialRequestAck,
    SearchResult,
};
use crate::session::{format_date, is_valid_node_id};

/// Operaciones remotas que necesita el orquestador del chat.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn search_by_similarity(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    async fn submit_material_request(&self, request: &MaterialRequest) -> Result<MaterialRequestAck>;
}

/// Cliente sin estado propio: sólo guarda el pool HTTP y la URL base.
#[derive(Debug, Clone)]
pub struct PerkClient {
    http: reqwest::Client,
    base_url: String,
}

impl PerkClient {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {url}");

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("La Perk API respondió {status} en {path}: {detail}"));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ChatBackend for PerkClient {
    async fn search_by_similarity(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let body = json!({ "query": query, "limit": limit });
        let results: Vec<SearchResult> =
            self.post_json("/chatbot/search", &body).await.map_err(|e| {
                error!("Error en la búsqueda: {e}");
                e
            })?;

        let invalid = results
            .iter()
            .filter(|r| !is_valid_node_id(&r.node.id))
            .count();
        if invalid > 0 {
            warn!("La búsqueda devolvió {invalid} nodo(s) sin id; sus enlaces quedarán vacíos.");
        }
        Ok(results)
    }

    async fn submit_material_request(&self, request: &MaterialRequest) -> Result<MaterialRequestAck> {
        let embed = build_discord_embed(request, Utc::now());
        let body = json!({ "embed": embed, "request": request });
        self.post_json("/chatbot/material-request", &body)
            .await
            .map_err(|e| {
                error!("Error enviando la solicitud de material: {e}");
                e
            })
    }
}

/// Construye el embed de Discord que se publica en el canal de revisión.
pub fn build_discord_embed(
    request: &MaterialRequest,
    generated_at: DateTime<Utc>,
) -> DiscordEmbedPayload {
    let mut fields = vec![
        EmbedField {
            name: "User Intent".to_string(),
            value: request.user_intent.clone(),
            inline: None,
        },
        EmbedField {
            name: "Session ID".to_string(),
            value: request.session_id.clone(),
            inline: Some(true),
        },
        EmbedField {
            name: "Timestamp".to_string(),
            value: format_date(request.timestamp),
            inline: Some(true),
        },
    ];

    if let Some(user) = request.user_identification.as_deref().filter(|u| !u.is_empty()) {
        fields.push(EmbedField {
            name: "User".to_string(),
            value: user.to_string(),
            inline: None,
        });
    }

    if !request.suggested_materials.is_empty() {
        let materials = request
            .suggested_materials
            .iter()
            .map(|r| format!("- {}", r.node.name))
            .collect::<Vec<_>>()
            .join("\n");
        fields.push(EmbedField {
            name: "Related Materials Found".to_string(),
            value: materials,
            inline: None,
        });
    }

    DiscordEmbedPayload {
        content: None,
        embeds: vec![Embed {
            title: "New Material Request".to_string(),
            description: "A user has requested to add new learning materials to WBP.".to_string(),
            fields,
            footer: Some(EmbedFooter {
                text: "WBP Chatbot".to_string(),
            }),
            timestamp: Some(format_date(generated_at)),
        }],
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{http::StatusCode, routing::post, Json, Router};
    use chrono::TimeZone;
    use serde_json::Value;
    use tokio_test::{assert_err, assert_ok};

    /// Servidor simulado de la Perk API. Guarda los cuerpos recibidos.
    pub(crate) async fn spawn_mock_api(fail: bool) -> (Url, Arc<Mutex<Vec<Value>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let search_log = received.clone();
        let request_log = received.clone();

        let app = Router::new()
            .route(
                "/chatbot/search",
                post(move |Json(body): Json<Value>| {
                    let log = search_log.clone();
                    async move {
                        log.lock().unwrap().push(body);
                        if fail {
                            return Err(StatusCode::SERVICE_UNAVAILABLE);
                        }
                        Ok(Json(json!([
                            { "node": { "id": "550e8400-e29b-41d4-a716-446655440000", "name": "JavaScript Basics" }, "similarity": 0.95 },
                            { "node": { "id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8", "name": "MDN JavaScript Tutorial" }, "similarity": 0.87 }
                        ])))
                    }
                }),
            )
            .route(
                "/chatbot/material-request",
                post(move |Json(body): Json<Value>| {
                    let log = request_log.clone();
                    async move {
                        log.lock().unwrap().push(body);
                        Json(json!({ "success": true }))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (Url::parse(&format!("http://{addr}")).unwrap(), received)
    }

    fn request(user: Option<&str>, materials: Vec<SearchResult>) -> MaterialRequest {
        MaterialRequest {
            user_intent: "Add React tutorial".to_string(),
            suggested_materials: materials,
            user_identification: user.map(str::to_string),
            session_id: "test_session".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn searches_by_similarity() {
        let (base, received) = spawn_mock_api(false).await;
        let client = PerkClient::new(&base, Duration::from_secs(5)).unwrap();

        let results = assert_ok!(client.search_by_similarity("javascript", 10).await);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node.name, "JavaScript Basics");

        let bodies = received.lock().unwrap();
        assert_eq!(bodies[0], json!({ "query": "javascript", "limit": 10 }));
    }

    #[tokio::test]
    async fn submits_material_request_with_embed() {
        let (base, received) = spawn_mock_api(false).await;
        let client = PerkClient::new(&base, Duration::from_secs(5)).unwrap();

        let ack = assert_ok!(client.submit_material_request(&request(None, vec![])).await);
        assert!(ack.success);

        let bodies = received.lock().unwrap();
        assert_eq!(bodies[0]["request"]["userIntent"], "Add React tutorial");
        assert_eq!(bodies[0]["request"]["sessionId"], "test_session");
        assert_eq!(bodies[0]["embed"]["embeds"][0]["title"], "New Material Request");
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let (base, _) = spawn_mock_api(true).await;
        let client = PerkClient::new(&base, Duration::from_secs(5)).unwrap();
        let err = assert_err!(client.search_by_similarity("x", 10).await);
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn trailing_slash_in_base_url_is_ignored() {
        let base = Url::parse("http://localhost:3000/api/").unwrap();
        let client = PerkClient::new(&base, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/api");
    }

    #[test]
    fn embed_has_core_fields_only_when_optional_data_missing() {
        let generated = Utc.with_ymd_and_hms(2024, 5, 2, 8, 1, 0).unwrap();
        let payload = build_discord_embed(&request(None, vec![]), generated);
        let embed = &payload.embeds[0];

        let names: Vec<&str> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["User Intent", "Session ID", "Timestamp"]);
        assert_eq!(embed.fields[1].inline, Some(true));
        assert_eq!(embed.fields[2].value, "2024-05-02T08:00:00.000Z");
        assert_eq!(embed.timestamp.as_deref(), Some("2024-05-02T08:01:00.000Z"));
        assert_eq!(embed.footer.as_ref().unwrap().text, "WBP Chatbot");
    }

    #[test]
    fn embed_lists_user_and_related_materials() {
        let materials = vec![
            SearchResult::new("X", "JavaScript Basics", 0.95),
            SearchResult::new("Y", "React Fundamentals", 0.87),
        ];
        let payload = build_discord_embed(&request(Some("ana@example.org"), materials), Utc::now());
        let fields = &payload.embeds[0].fields;

        assert_eq!(fields[3].name, "User");
        assert_eq!(fields[3].value, "ana@example.org");
        assert_eq!(fields[4].name, "Related Materials Found");
        assert_eq!(fields[4].value, "- JavaScript Basics\n- React Fundamentals");
    }
}
