use crate::core::history::OutboundMessage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a chat-completion call.
///
/// The `Display` text is what the user sees in the stored error message.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model \"{model}\" not found. Run 'ollama list' to see available models, or pull it with 'ollama pull {model}'")]
    ModelNotFound { model: String },

    #[error("Ollama returned {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("{0}")]
    Transport(String),

    #[error("Invalid response from model server: {0}")]
    Decode(String),
}

/// Model server operations used by the session and the CLI
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the full history and return the assistant reply text
    async fn send_chat_message(
        &self,
        server_url: &str,
        model: &str,
        history: &[OutboundMessage],
    ) -> Result<String, ModelError>;

    /// Names of the models the server offers; empty on any failure
    async fn list_models(&self, server_url: &str) -> Vec<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [OutboundMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: Option<String>,
    model: Option<String>,
}

/// HTTP client for Ollama's `/api/chat` and `/api/tags`
#[derive(Debug, Clone, Default)]
pub struct OllamaClient {
    client: Client,
}

impl OllamaClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn endpoint(server_url: &str, route: &str) -> String {
        format!("{}{}", server_url.trim_end_matches('/'), route)
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn send_chat_message(
        &self,
        server_url: &str,
        model: &str,
        history: &[OutboundMessage],
    ) -> Result<String, ModelError> {
        let url = Self::endpoint(server_url, "/api/chat");
        let request = ChatRequest {
            model,
            messages: history,
            stream: false,
        };

        tracing::debug!(
            "[OllamaClient] POST {} model={} messages={}",
            url,
            model,
            history.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("[OllamaClient] Server returned {}: {}", status, body);

            if status == StatusCode::NOT_FOUND {
                return Err(ModelError::ModelNotFound {
                    model: model.to_string(),
                });
            }
            return Err(ModelError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let reply = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        Ok(reply.message.content)
    }

    async fn list_models(&self, server_url: &str) -> Vec<String> {
        let url = Self::endpoint(server_url, "/api/tags");

        let response = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!("[OllamaClient] Model listing returned {}", resp.status());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("[OllamaClient] Model listing failed: {}", e);
                return Vec::new();
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => tags
                .models
                .into_iter()
                .filter_map(|tag| tag.name.or(tag.model))
                .collect(),
            Err(e) => {
                tracing::warn!("[OllamaClient] Could not decode model listing: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn history() -> Vec<OutboundMessage> {
        vec![OutboundMessage::new(Role::User, "hi")]
    }

    #[tokio::test]
    async fn test_chat_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3",
                "stream": false,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "Hello!"}
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::new();
        let reply = client
            .send_chat_message(&format!("{}/", server.uri()), "llama3", &history())
            .await
            .unwrap();

        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn test_chat_missing_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = OllamaClient::new()
            .send_chat_message(&server.uri(), "mystery", &history())
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::ModelNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "Model \"mystery\" not found. Run 'ollama list' to see available models, or pull it with 'ollama pull mystery'"
        );
    }

    #[tokio::test]
    async fn test_chat_server_error_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = OllamaClient::new()
            .send_chat_message(&server.uri(), "llama3", &history())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Ollama returned 500: Internal Server Error");
    }

    #[tokio::test]
    async fn test_chat_unreachable_server_is_transport_error() {
        let err = OllamaClient::new()
            .send_chat_message("http://127.0.0.1:9", "llama3", &history())
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Transport(_)));
    }

    #[tokio::test]
    async fn test_list_models_reads_name_or_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "llama3:8b"}, {"model": "qwen2:7b"}, {}]
            })))
            .mount(&server)
            .await;

        let models = OllamaClient::new().list_models(&server.uri()).await;
        assert_eq!(models, vec!["llama3:8b".to_string(), "qwen2:7b".to_string()]);
    }

    #[tokio::test]
    async fn test_list_models_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(OllamaClient::new().list_models(&server.uri()).await.is_empty());
        assert!(OllamaClient::new().list_models("http://127.0.0.1:9").await.is_empty());
    }
}
