//! Integration tests for conversation persistence
//!
//! These run against in-memory stores and scripted model clients, so no
//! model server or database is needed.

use async_trait::async_trait;
use parley::core::history::OutboundMessage;
use parley::core::message::{ConversationRecord, Message, Role, StoredConversation, TitlePolicy};
use parley::core::ollama::{ModelClient, ModelError};
use parley::storage::{
    LocalStore, MemoryKv, MemoryRemoteStore, RemoteStore, SqliteStore, StoreError, StoreResult,
};
use parley::uploads::Attachments;
use parley::{
    ChatPreferences, ConversationRegistry, ConversationSession, ConversationSummary, SendOutcome,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

/// Pause point for a scripted call
#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// Memory store whose loads can be paused, failed or hidden, and whose saves are
/// counted or left hanging
#[derive(Default)]
struct ScriptedRemote {
    inner: MemoryRemoteStore,
    load_gates: Mutex<HashMap<String, Arc<Gate>>>,
    fail_loads: AtomicBool,
    hide_rows: AtomicBool,
    hang_saves: AtomicBool,
    saves: AtomicUsize,
}

impl ScriptedRemote {
    fn gate_load(&self, id: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.load_gates
            .lock()
            .unwrap()
            .insert(id.to_string(), gate.clone());
        gate
    }

    fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn list(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>> {
        self.inner.list(user_id).await
    }

    async fn load(&self, user_id: &str, id: &str) -> StoreResult<Option<StoredConversation>> {
        let gate = self.load_gates.lock().unwrap().get(id).cloned();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted outage".to_string()));
        }
        if self.hide_rows.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.load(user_id, id).await
    }

    async fn save(
        &self,
        user_id: &str,
        id: &str,
        title: &str,
        messages: &[Message],
        model: Option<&str>,
    ) -> StoreResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.hang_saves.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.save(user_id, id, title, messages, model).await
    }

    async fn update_title(&self, user_id: &str, id: &str, title: &str) -> StoreResult<()> {
        self.inner.update_title(user_id, id, title).await
    }

    async fn update_model(&self, user_id: &str, id: &str, model: &str) -> StoreResult<()> {
        self.inner.update_model(user_id, id, model).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> StoreResult<()> {
        self.inner.delete(user_id, id).await
    }
}

/// Replies with the last user text, optionally waiting on a gate first
#[derive(Default)]
struct ScriptedModel {
    gate: Option<Arc<Gate>>,
    fail_with: Option<String>,
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn send_chat_message(
        &self,
        _server_url: &str,
        model: &str,
        history: &[OutboundMessage],
    ) -> Result<String, ModelError> {
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if let Some(missing) = &self.fail_with {
            return Err(ModelError::ModelNotFound {
                model: missing.clone(),
            });
        }
        let last = history.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("[{}] {}", model, last))
    }

    async fn list_models(&self, _server_url: &str) -> Vec<String> {
        Vec::new()
    }
}

struct Fixture {
    local: LocalStore,
    registry: Arc<ConversationRegistry>,
    session: Arc<ConversationSession>,
}

fn fixture(remote: Arc<ScriptedRemote>, local: LocalStore, model: ScriptedModel) -> Fixture {
    let registry = Arc::new(ConversationRegistry::new(
        remote.clone(),
        local.clone(),
        TitlePolicy::default(),
    ));
    let preferences = Arc::new(RwLock::new(ChatPreferences::new(
        "http://localhost:11434",
        "llama3",
    )));
    let session = Arc::new(ConversationSession::new(
        registry.clone(),
        remote,
        local.clone(),
        Arc::new(model),
        preferences,
    ));
    Fixture {
        local,
        registry,
        session,
    }
}

fn empty_local() -> LocalStore {
    LocalStore::new(Arc::new(MemoryKv::new()))
}

/// Two stored conversations "a" and "b" ("b" most recent)
async fn seeded_remote(local: &LocalStore) -> Arc<ScriptedRemote> {
    let remote = Arc::new(ScriptedRemote::default());
    let user = local.user_id();
    remote
        .inner
        .save(&user, "a", "alpha", &[Message::user("alpha")], None)
        .await
        .unwrap();
    remote
        .inner
        .save(&user, "b", "beta", &[Message::user("beta")], None)
        .await
        .unwrap();
    remote
}

fn contents(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.content.clone()).collect()
}

#[tokio::test]
async fn test_failed_remote_load_uses_local_record() {
    let local = empty_local();
    let remote = seeded_remote(&local).await;
    local.save_conversation(
        "a",
        &ConversationRecord::new("local alpha", vec![Message::user("from disk")], None),
    );
    remote.fail_loads.store(true, Ordering::SeqCst);
    let f = fixture(remote, local, ScriptedModel::default());

    f.registry.initialize("llama3").await;
    f.registry.select_chat("a").await;
    f.session.switch_to(Some("a".to_string())).await;

    assert_eq!(contents(&f.session.messages().await), vec!["from disk"]);
}

#[tokio::test]
async fn test_missing_remote_row_uses_local_or_empty() {
    let local = empty_local();
    let remote = seeded_remote(&local).await;
    local.save_conversation(
        "a",
        &ConversationRecord::new("local alpha", vec![Message::user("from disk")], None),
    );
    remote.hide_rows.store(true, Ordering::SeqCst);
    let f = fixture(remote, local, ScriptedModel::default());
    f.registry.initialize("llama3").await;

    f.session.switch_to(Some("a".to_string())).await;
    assert_eq!(contents(&f.session.messages().await), vec!["from disk"]);

    f.session.switch_to(Some("b".to_string())).await;
    assert!(f.session.messages().await.is_empty());
    assert!(f.session.is_ready().await);
}

#[tokio::test]
async fn test_remote_list_outage_rebuilds_from_local_index() {
    let local = empty_local();
    let remote = Arc::new(ScriptedRemote::default());
    remote.inner.set_available(false);
    local.save_conversation(
        "kept",
        &ConversationRecord::new("Kept", vec![Message::user("Kept")], Some("mistral".into())),
    );
    local.set_conversation_ids(&["kept".to_string()]);
    let f = fixture(remote, local, ScriptedModel::default());

    let active = f.registry.initialize("llama3").await;
    f.session.switch_to(active.clone()).await;

    assert_eq!(active.as_deref(), Some("kept"));
    let listed = f.registry.conversations().await;
    assert_eq!(listed[0].title, "Kept");
    assert_eq!(listed[0].model.as_deref(), Some("mistral"));
    assert_eq!(contents(&f.session.messages().await), vec!["Kept"]);
}

async fn race_switches(release_first: &str) -> Vec<String> {
    let local = empty_local();
    let remote = seeded_remote(&local).await;
    let gate_a = remote.gate_load("a");
    let gate_b = remote.gate_load("b");
    let f = fixture(remote, local, ScriptedModel::default());
    f.registry.initialize("llama3").await;

    let session = f.session.clone();
    let to_a = tokio::spawn(async move { session.switch_to(Some("a".to_string())).await });
    gate_a.entered.notified().await;

    let session = f.session.clone();
    let to_b = tokio::spawn(async move { session.switch_to(Some("b".to_string())).await });
    gate_b.entered.notified().await;

    if release_first == "a" {
        gate_a.release.notify_one();
        to_a.await.unwrap();
        gate_b.release.notify_one();
        to_b.await.unwrap();
    } else {
        gate_b.release.notify_one();
        to_b.await.unwrap();
        gate_a.release.notify_one();
        to_a.await.unwrap();
    }

    assert_eq!(f.session.current_id().await.as_deref(), Some("b"));
    contents(&f.session.messages().await)
}

#[tokio::test]
async fn test_late_load_of_previous_conversation_is_discarded() {
    assert_eq!(race_switches("b").await, vec!["beta"]);
}

#[tokio::test]
async fn test_switch_result_independent_of_resolution_order() {
    assert_eq!(race_switches("a").await, vec!["beta"]);
}

#[tokio::test]
async fn test_nothing_is_saved_while_a_load_is_pending() {
    let local = empty_local();
    let remote = seeded_remote(&local).await;
    let gate = remote.gate_load("a");
    let f = fixture(remote.clone(), local, ScriptedModel::default());
    f.registry.initialize("llama3").await;
    f.session.switch_to(Some("b".to_string())).await;
    let saves_before = remote.saves();

    let session = f.session.clone();
    let switching = tokio::spawn(async move { session.switch_to(Some("a".to_string())).await });
    gate.entered.notified().await;

    assert!(!f.session.add_message(Message::system("note")).await);
    f.session.set_input("typed during load").await;
    assert_eq!(
        f.session.send_message(&Attachments::default()).await,
        SendOutcome::Busy
    );
    assert_eq!(remote.saves(), saves_before);

    gate.release.notify_one();
    switching.await.unwrap();
    assert_eq!(contents(&f.session.messages().await), vec!["alpha"]);
}

#[tokio::test]
async fn test_empty_conversation_is_never_saved() {
    let remote = Arc::new(ScriptedRemote::default());
    let f = fixture(remote.clone(), empty_local(), ScriptedModel::default());

    let active = f.registry.initialize("llama3").await;
    let created = remote.saves();
    f.session.switch_to(active.clone()).await;
    f.session.set_input("   ").await;
    assert_eq!(
        f.session.send_message(&Attachments::default()).await,
        SendOutcome::Skipped
    );

    f.session.flush_remote().await;

    assert!(f.session.messages().await.is_empty());
    assert_eq!(remote.saves(), created);
    let record = f.local.conversation(active.as_deref().unwrap()).unwrap();
    assert!(record.messages.is_empty());
}

#[tokio::test]
async fn test_derived_title_is_truncated() {
    let f = fixture(
        Arc::new(ScriptedRemote::default()),
        empty_local(),
        ScriptedModel::default(),
    );
    let id = f.registry.initialize("llama3").await.unwrap();
    f.session.switch_to(Some(id.clone())).await;

    f.session.add_message(Message::system("📷 Image uploaded: cat.png")).await;
    assert_eq!(f.registry.conversations().await[0].title, "New chat");

    let text = "Hello world this is a long message exceeding fifty characters definitely";
    f.session.set_input(text).await;
    f.session.send_message(&Attachments::default()).await;

    let expected = format!("{}...", &text[..50]);
    assert_eq!(f.registry.conversations().await[0].title, expected);
    assert_eq!(f.local.conversation(&id).unwrap().title, expected);
}

#[tokio::test]
async fn test_delete_active_reselects_next_most_recent() {
    let f = fixture(
        Arc::new(ScriptedRemote::default()),
        empty_local(),
        ScriptedModel::default(),
    );
    let oldest = f.registry.initialize("llama3").await.unwrap();
    let middle = f.registry.new_chat("llama3").await;
    let newest = f.registry.new_chat("llama3").await;
    assert_eq!(f.registry.active_id().await.as_deref(), Some(newest.as_str()));

    assert_eq!(f.registry.delete_chat(&newest).await, Some(middle.clone()));
    assert_eq!(f.registry.delete_chat(&middle).await, Some(oldest.clone()));
    assert_eq!(f.registry.delete_chat(&oldest).await, None);
    assert!(f.local.active_id().is_none());
    assert!(f.local.conversation_ids().is_empty());
}

#[tokio::test]
async fn test_double_delete_is_harmless() {
    let remote = Arc::new(ScriptedRemote::default());
    let f = fixture(remote.clone(), empty_local(), ScriptedModel::default());
    let keep = f.registry.initialize("llama3").await.unwrap();
    let doomed = f.registry.new_chat("llama3").await;

    let first = f.registry.delete_chat(&doomed).await;
    let second = f.registry.delete_chat(&doomed).await;

    assert_eq!(first, Some(keep.clone()));
    assert_eq!(second, Some(keep.clone()));
    let ids: Vec<String> = f
        .registry
        .conversations()
        .await
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![keep]);
    assert_eq!(remote.inner.row_count(&f.local.user_id()).await, 1);
}

#[tokio::test]
async fn test_saved_conversation_loads_back_identically() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut error = Message::error("❌ Ollama returned 500: Internal Server Error");
    error.timestamp = "2024-05-01T10:00:02.000Z".to_string();
    let messages = vec![
        Message::system("📄 Document uploaded: notes.md (7 characters)"),
        Message::user("Summarise \"notes.md\" ünïcödé"),
        Message::assistant("Sure."),
        error,
    ];

    store
        .save("user_1", "c1", "Summarise", &messages, Some("llama3"))
        .await
        .unwrap();
    let loaded = store.load("user_1", "c1").await.unwrap().unwrap();

    assert_eq!(loaded.title, "Summarise");
    assert_eq!(
        serde_json::to_vec(&loaded.messages).unwrap(),
        serde_json::to_vec(&messages).unwrap()
    );
}

#[tokio::test]
async fn test_user_message_survives_model_failure() {
    let model = ScriptedModel {
        fail_with: Some("ghost-model".to_string()),
        ..Default::default()
    };
    let remote = Arc::new(ScriptedRemote::default());
    let f = fixture(remote.clone(), empty_local(), model);
    let id = f.registry.initialize("llama3").await.unwrap();
    f.session.switch_to(Some(id.clone())).await;

    f.session.set_input("hello?").await;
    let outcome = f.session.send_message(&Attachments::default()).await;

    let error = match outcome {
        SendOutcome::Failed(error) => error,
        other => panic!("expected a failed send, got {:?}", other),
    };
    assert!(error.is_error);
    assert!(error.content.starts_with("❌ Model \"ghost-model\" not found"));
    assert!(!f.session.is_loading());

    let stored = f.local.conversation(&id).unwrap();
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].role, Role::User);
    assert_eq!(stored.messages[0].content, "hello?");
    assert!(stored.messages[1].is_error);

    f.session.flush_remote().await;
    let remote_copy = remote
        .load(&f.local.user_id(), &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote_copy.messages, stored.messages);
}

#[tokio::test]
async fn test_late_reply_goes_to_the_conversation_that_asked() {
    let gate = Arc::new(Gate::default());
    let model = ScriptedModel {
        gate: Some(gate.clone()),
        ..Default::default()
    };
    let f = fixture(Arc::new(ScriptedRemote::default()), empty_local(), model);
    let asked = f.registry.initialize("llama3").await.unwrap();
    f.session.switch_to(Some(asked.clone())).await;

    f.session.set_input("slow question").await;
    let session = f.session.clone();
    let sending =
        tokio::spawn(async move { session.send_message(&Attachments::default()).await });
    gate.entered.notified().await;

    let other = f.registry.new_chat("llama3").await;
    f.session.switch_to(Some(other.clone())).await;
    gate.release.notify_one();
    let outcome = sending.await.unwrap();

    assert!(matches!(outcome, SendOutcome::Replied(_)));
    assert!(f.session.messages().await.is_empty());
    assert!(f.local.conversation(&other).unwrap().messages.is_empty());

    let answered = f.local.conversation(&asked).unwrap();
    assert_eq!(
        contents(&answered.messages),
        vec!["slow question", "[llama3] slow question"]
    );

    f.session.switch_to(Some(asked)).await;
    assert_eq!(f.session.messages().await.len(), 2);
}

#[tokio::test]
async fn test_reply_for_deleted_conversation_is_dropped() {
    let gate = Arc::new(Gate::default());
    let model = ScriptedModel {
        gate: Some(gate.clone()),
        ..Default::default()
    };
    let f = fixture(Arc::new(ScriptedRemote::default()), empty_local(), model);
    let doomed = f.registry.initialize("llama3").await.unwrap();
    f.session.switch_to(Some(doomed.clone())).await;

    f.session.set_input("never mind").await;
    let session = f.session.clone();
    let sending =
        tokio::spawn(async move { session.send_message(&Attachments::default()).await });
    gate.entered.notified().await;

    let next = f.registry.delete_chat(&doomed).await;
    f.session.switch_to(next).await;
    gate.release.notify_one();
    sending.await.unwrap();

    assert!(f.local.conversation(&doomed).is_none());
    assert!(!f.local.conversation_ids().contains(&doomed));
}

#[tokio::test]
async fn test_hung_remote_save_does_not_block_send() {
    let local = empty_local();
    let remote = seeded_remote(&local).await;
    remote.hang_saves.store(true, Ordering::SeqCst);
    let f = fixture(remote.clone(), local, ScriptedModel::default());
    f.registry.initialize("llama3").await;
    f.session.switch_to(Some("a".to_string())).await;

    f.session.set_input("still there?").await;
    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        f.session.send_message(&Attachments::default()),
    )
    .await
    .expect("send waited on the remote store");

    assert!(matches!(outcome, SendOutcome::Replied(_)));
    assert_eq!(
        contents(&f.local.conversation("a").unwrap().messages),
        vec!["alpha", "still there?", "[llama3] still there?"]
    );

    f.session.set_input("and again").await;
    let second = tokio::time::timeout(
        Duration::from_secs(2),
        f.session.send_message(&Attachments::default()),
    )
    .await
    .expect("second send waited on the remote store");
    assert!(matches!(second, SendOutcome::Replied(_)));
    assert_eq!(f.local.conversation("a").unwrap().messages.len(), 5);
}

#[tokio::test]
async fn test_late_reply_survives_reload_of_same_conversation() {
    let gate = Arc::new(Gate::default());
    let model = ScriptedModel {
        gate: Some(gate.clone()),
        ..Default::default()
    };
    let remote = Arc::new(ScriptedRemote::default());
    let f = fixture(remote.clone(), empty_local(), model);
    let asked = f.registry.initialize("llama3").await.unwrap();
    f.session.switch_to(Some(asked.clone())).await;

    f.session.set_input("slow question").await;
    let session = f.session.clone();
    let sending =
        tokio::spawn(async move { session.send_message(&Attachments::default()).await });
    gate.entered.notified().await;

    let other = f.registry.new_chat("llama3").await;
    f.session.switch_to(Some(other)).await;
    f.session.flush_remote().await;

    let load_gate = remote.gate_load(&asked);
    let session = f.session.clone();
    let target = asked.clone();
    let reloading = tokio::spawn(async move { session.switch_to(Some(target)).await });
    load_gate.entered.notified().await;

    gate.release.notify_one();
    sending.await.unwrap();
    load_gate.release.notify_one();
    reloading.await.unwrap();

    assert_eq!(
        contents(&f.session.messages().await),
        vec!["slow question", "[llama3] slow question"]
    );

    f.session.add_message(Message::system("note")).await;
    assert_eq!(
        contents(&f.local.conversation(&asked).unwrap().messages),
        vec!["slow question", "[llama3] slow question", "note"]
    );
}
