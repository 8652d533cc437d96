//! PostgREST Remote Store
//!
//! Information Hiding:
//! - REST filter syntax, auth headers and upsert preferences hidden from callers
//! - PGRST116 ("no rows for a single-object request") mapped to `Ok(None)`
//! - Error bodies decoded into `StoreError::Status`

use super::{RemoteStore, StoreError, StoreResult};
use crate::core::message::{now_timestamp, ConversationSummary, Message, StoredConversation};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

const NO_ROWS_CODE: &str = "PGRST116";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationRow {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    title: String,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpsertRow<'a> {
    id: &'a str,
    user_id: &'a str,
    title: &'a str,
    messages: &'a [Message],
    updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Conversation table exposed through a PostgREST endpoint (e.g. Supabase)
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl PostgrestStore {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table),
            api_key: api_key.to_string(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn row_filter(user_id: &str, id: &str) -> [(&'static str, String); 2] {
        [("id", format!("eq.{}", id)), ("user_id", format!("eq.{}", user_id))]
    }

    async fn check(response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
        let (code, message) = match body {
            Some(body) => (body.code, body.message.unwrap_or_else(|| text.clone())),
            None => (None, text),
        };
        if code.as_deref() == Some(NO_ROWS_CODE) {
            tracing::debug!("[PostgrestStore] {} (code {:?}): {}", status, code, message);
        } else {
            tracing::warn!(
                "[PostgrestStore] {} (code {:?}): {}",
                status,
                code,
                message
            );
        }
        Err(StoreError::Status {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl RemoteStore for PostgrestStore {
    async fn list(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        let response = self
            .authorize(self.client.get(&self.endpoint))
            .query(&[
                ("select", "id,title,updated_at,model".to_string()),
                ("user_id", format!("eq.{}", user_id)),
                ("order", "updated_at.desc".to_string()),
            ])
            .send()
            .await?;

        let summaries: Vec<ConversationSummary> = Self::check(response).await?.json().await?;
        tracing::debug!("[PostgrestStore] Listed {} conversations", summaries.len());
        Ok(summaries)
    }

    async fn load(&self, user_id: &str, id: &str) -> StoreResult<Option<StoredConversation>> {
        let response = self
            .authorize(self.client.get(&self.endpoint))
            .header("Accept", SINGLE_OBJECT)
            .query(&[("select", "messages,title,model".to_string())])
            .query(&Self::row_filter(user_id, id))
            .send()
            .await?;

        match Self::check(response).await {
            Ok(response) => {
                let row: ConversationRow = response.json().await?;
                Ok(Some(StoredConversation {
                    messages: row.messages,
                    title: row.title,
                    model: row.model,
                }))
            }
            Err(StoreError::Status { code: Some(code), .. }) if code == NO_ROWS_CODE => {
                tracing::debug!("[PostgrestStore] No row for '{}'", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn save(
        &self,
        user_id: &str,
        id: &str,
        title: &str,
        messages: &[Message],
        model: Option<&str>,
    ) -> StoreResult<()> {
        let row = UpsertRow {
            id,
            user_id,
            title,
            messages,
            updated_at: now_timestamp(),
            model,
        };

        let response = self
            .authorize(self.client.post(&self.endpoint))
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        Self::check(response).await?;

        tracing::debug!("[PostgrestStore] Saved {} messages for '{}'", messages.len(), id);
        Ok(())
    }

    async fn update_title(&self, user_id: &str, id: &str, title: &str) -> StoreResult<()> {
        let response = self
            .authorize(self.client.patch(&self.endpoint))
            .query(&Self::row_filter(user_id, id))
            .json(&serde_json::json!({ "title": title, "updated_at": now_timestamp() }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_model(&self, user_id: &str, id: &str, model: &str) -> StoreResult<()> {
        let response = self
            .authorize(self.client.patch(&self.endpoint))
            .query(&Self::row_filter(user_id, id))
            .json(&serde_json::json!({ "model": model, "updated_at": now_timestamp() }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        let response = self
            .authorize(self.client.delete(&self.endpoint))
            .query(&Self::row_filter(user_id, id))
            .send()
            .await?;
        Self::check(response).await?;
        tracing::debug!("[PostgrestStore] Deleted '{}'", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, headers, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TABLE_PATH: &str = "/rest/v1/conversations";

    async fn store(server: &MockServer) -> PostgrestStore {
        PostgrestStore::new(&server.uri(), "anon-key", "conversations")
    }

    #[tokio::test]
    async fn test_list_sends_filters_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .and(query_param("user_id", "eq.user_1"))
            .and(query_param("order", "updated_at.desc"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "b", "title": "Second", "updated_at": "2024-05-02T10:00:00+00:00", "model": "llama3"},
                {"id": "a", "title": "First", "updated_at": "2024-05-01T10:00:00+00:00", "model": null}
            ])))
            .mount(&server)
            .await;

        let listed = store(&server).await.list("user_1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "b");
        assert_eq!(listed[0].model.as_deref(), Some("llama3"));
        assert!(listed[1].model.is_none());
    }

    #[tokio::test]
    async fn test_load_returns_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .and(query_param("id", "eq.c1"))
            .and(header("Accept", SINGLE_OBJECT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [
                    {"role": "user", "content": "hi", "timestamp": "2024-05-01T10:00:00.000Z"}
                ],
                "title": "hi",
                "model": null
            })))
            .mount(&server)
            .await;

        let loaded = store(&server).await.load("user_1", "c1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "hi");
        assert_eq!(loaded.messages.len(), 1);
        assert!(loaded.model.is_none());
    }

    #[tokio::test]
    async fn test_load_no_rows_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .respond_with(ResponseTemplate::new(406).set_body_json(json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned"
            })))
            .mount(&server)
            .await;

        assert!(store(&server).await.load("user_1", "gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_not_acceptable_without_no_rows_code_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .respond_with(ResponseTemplate::new(406).set_body_json(json!({
                "code": "PGRST106",
                "message": "The schema must be one of the following: public"
            })))
            .mount(&server)
            .await;

        let err = store(&server).await.load("user_1", "c1").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Status { status: 406, code: Some(ref code), .. } if code == "PGRST106"
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(TABLE_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = store(&server).await.list("user_1").await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_save_upserts_by_id_without_null_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TABLE_PATH))
            .and(query_param("on_conflict", "id"))
            .and(headers(
                "Prefer",
                vec!["resolution=merge-duplicates", "return=minimal"],
            ))
            .and(body_partial_json(json!({"id": "c1", "user_id": "user_1", "title": "t"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .await
            .save("user_1", "c1", "t", &[Message::user("t")], None)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete_target_one_row() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(TABLE_PATH))
            .and(query_param("id", "eq.c1"))
            .and(query_param("user_id", "eq.user_1"))
            .and(body_partial_json(json!({"title": "Renamed"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(TABLE_PATH))
            .and(query_param("id", "eq.c1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = store(&server).await;
        store.update_title("user_1", "c1", "Renamed").await.unwrap();
        store.delete("user_1", "c1").await.unwrap();
    }
}
