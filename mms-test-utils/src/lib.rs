//! MMS Test Utilities
//!
//! Shared test infrastructure for the MMS workspace:
//! - A scripted mock transport standing in for the REST backend
//! - Proptest generators for ids, versions and element payloads
//! - Fixtures for common element, view and config shapes
//! - Assertions for the error taxonomy

pub use mms_core::{
    element_key, CacheKey, ClientConfig, HttpFailure, MmsError, MmsResult, RequestOptions,
    Transport, TransportError, ValidationError,
};
pub use mms_storage::{CacheStore, EntryHandle, RefList};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// HTTP verb of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

/// One request as the mock saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// Computes a response from the request body.
pub type Responder = Arc<dyn Fn(Option<&Value>) -> Result<Value, TransportError> + Send + Sync>;

#[derive(Clone)]
enum Reply {
    Fixed(Result<Value, TransportError>),
    Computed(Responder),
}

impl Reply {
    fn resolve(self, body: Option<&Value>) -> Result<Value, TransportError> {
        match self {
            Self::Fixed(result) => result,
            Self::Computed(responder) => responder(body),
        }
    }
}

#[derive(Default)]
struct Route {
    queue: VecDeque<Reply>,
    sticky: Option<Reply>,
}

/// Scripted in-memory [`Transport`].
///
/// Each `(method, url)` pair has a FIFO queue of one-shot replies and an
/// optional sticky reply used once the queue is drained. Unscripted URLs
/// answer 404. Every call is recorded before it is answered, and
/// [`hold`](Self::hold) parks requests until [`release`](Self::release).
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    calls: Mutex<Vec<RecordedCall>>,
    gate: watch::Sender<bool>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate,
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, method: Method, url: &str, reply: Reply, sticky: bool) -> &Self {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let route = routes.entry((method, url.to_string())).or_default();
        if sticky {
            route.sticky = Some(reply);
        } else {
            route.queue.push_back(reply);
        }
        self
    }

    /// Answer every GET of `url` with `body`.
    pub fn on_get(&self, url: &str, body: Value) -> &Self {
        self.script(Method::Get, url, Reply::Fixed(Ok(body)), true)
    }

    /// Answer every POST to `url` with `body`.
    pub fn on_post(&self, url: &str, body: Value) -> &Self {
        self.script(Method::Post, url, Reply::Fixed(Ok(body)), true)
    }

    /// Answer every POST to `url` by calling `responder` with the request body.
    pub fn respond_post(
        &self,
        url: &str,
        responder: impl Fn(Option<&Value>) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) -> &Self {
        self.script(Method::Post, url, Reply::Computed(Arc::new(responder)), true)
    }

    /// Fail every GET of `url`.
    pub fn fail_get(&self, url: &str, status: u16, data: Value) -> &Self {
        self.script(
            Method::Get,
            url,
            Reply::Fixed(Err(TransportError::new(status, data))),
            true,
        )
    }

    /// Fail every POST to `url`.
    pub fn fail_post(&self, url: &str, status: u16, data: Value) -> &Self {
        self.script(
            Method::Post,
            url,
            Reply::Fixed(Err(TransportError::new(status, data))),
            true,
        )
    }

    /// Queue a single GET reply ahead of the sticky one.
    pub fn enqueue_get(&self, url: &str, reply: Result<Value, TransportError>) -> &Self {
        self.script(Method::Get, url, Reply::Fixed(reply), false)
    }

    /// Queue a single POST reply ahead of the sticky one.
    pub fn enqueue_post(&self, url: &str, reply: Result<Value, TransportError>) -> &Self {
        self.script(Method::Post, url, Reply::Fixed(reply), false)
    }

    /// Park incoming requests until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.method == method && c.url == url)
            .count()
    }

    pub fn get_count(&self, url: &str) -> usize {
        self.count(Method::Get, url)
    }

    pub fn post_count(&self, url: &str) -> usize {
        self.count(Method::Post, url)
    }

    /// Bodies of every POST to `url`, in call order.
    pub fn posted_bodies(&self, url: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.method == Method::Post && c.url == url)
            .map(|c| c.body.clone().unwrap_or(Value::Null))
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method,
                url: url.to_string(),
                body: body.cloned(),
            });

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let reply = {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            routes
                .get_mut(&(method, url.to_string()))
                .and_then(|route| route.queue.pop_front().or_else(|| route.sticky.clone()))
        };
        match reply {
            Some(reply) => reply.resolve(body),
            None => Err(TransportError::new(
                404,
                json!({ "message": format!("no scripted response for {url}") }),
            )),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        self.dispatch(Method::Get, url, None).await
    }

    async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value, TransportError> {
        self.dispatch(Method::Post, url, body).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for MMS payloads.

    use super::*;
    use proptest::prelude::*;

    /// Element identifier without the key delimiter.
    pub fn arb_element_id() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9_]{0,15}"
    }

    /// Workspace name, including the default.
    pub fn arb_workspace() -> impl Strategy<Value = String> {
        prop_oneof![Just("master".to_string()), "ws_[a-z0-9]{1,6}"]
    }

    /// Version: latest, a revision number, or a timestamp.
    pub fn arb_version() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("latest".to_string()),
            (1u32..10_000).prop_map(|n| n.to_string()),
            (2013u32..2030, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("{y}-{m:02}-{d:02}T00:00:00.000-0700")),
        ]
    }

    pub fn arb_specialization_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Property".to_string()),
            Just("View".to_string()),
            Just("Product".to_string()),
            Just("Package".to_string()),
            Just("Comment".to_string()),
            Just("Element".to_string()),
        ]
    }

    /// Fully hydrated element as the backend returns it.
    pub fn arb_element() -> impl Strategy<Value = Value> {
        (arb_element_id(), "[a-zA-Z ]{0,20}", arb_specialization_type()).prop_map(
            |(id, name, kind)| match kind.as_str() {
                "View" | "Product" => json!({
                    "sysmlid": id,
                    "name": name,
                    "specialization": {"type": kind, "contains": []}
                }),
                "Property" => json!({
                    "sysmlid": id,
                    "name": name,
                    "specialization": {"type": kind, "value": []}
                }),
                _ => json!({"sysmlid": id, "name": name, "specialization": {"type": kind}}),
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built payloads and configs.

    use super::*;

    pub const BASE_URL: &str = "http://mms.test/alfresco/service";

    /// Config pointing at [`BASE_URL`].
    pub fn test_config() -> ClientConfig {
        ClientConfig::with_base_url(BASE_URL)
    }

    /// `{kind: items}` response envelope.
    pub fn envelope(kind: &str, items: Vec<Value>) -> Value {
        json!({ kind: items })
    }

    pub fn elements(items: Vec<Value>) -> Value {
        envelope("elements", items)
    }

    pub fn element(id: &str, name: &str) -> Value {
        json!({
            "sysmlid": id,
            "name": name,
            "owner": "holding_bin_project",
            "read": "2015-01-01T00:00:00.000-0700",
            "modified": "2015-01-01T00:00:00.000-0700",
            "creator": "admin"
        })
    }

    pub fn property(id: &str, value: Value) -> Value {
        json!({
            "sysmlid": id,
            "name": id,
            "read": "2015-01-01T00:00:00.000-0700",
            "specialization": {"type": "Property", "value": value}
        })
    }

    /// View with its `contains` aggregate.
    pub fn view(id: &str, name: &str) -> Value {
        json!({
            "sysmlid": id,
            "name": name,
            "read": "2015-01-01T00:00:00.000-0700",
            "specialization": {
                "type": "View",
                "contains": [],
                "displayedElements": [id],
                "allowedElements": [id],
                "childrenViews": []
            }
        })
    }

    /// View as seeded by a list endpoint, without `contains`.
    pub fn partial_view(id: &str, name: &str) -> Value {
        json!({
            "sysmlid": id,
            "name": name,
            "specialization": {"type": "View"}
        })
    }

    pub fn product(id: &str, name: &str, view2view: Value) -> Value {
        json!({
            "sysmlid": id,
            "name": name,
            "read": "2015-01-01T00:00:00.000-0700",
            "specialization": {
                "type": "Product",
                "contains": [],
                "view2view": view2view
            }
        })
    }

    pub fn config(id: &str, name: &str) -> Value {
        json!({"id": id, "name": name, "description": ""})
    }

    pub fn snapshot(id: &str, created: &str) -> Value {
        json!({"id": id, "created": created, "sysmlid": format!("{id}_doc")})
    }

    pub fn site(name: &str, title: &str) -> Value {
        json!({"name": name, "title": title, "parent": "no_parent"})
    }

    /// Workspace listing entry. `parent` is null for the root workspace.
    pub fn workspace(name: &str, parent: Option<&str>) -> Value {
        json!({"id": name, "name": name, "parent": parent, "creator": "admin"})
    }

    /// Responder that echoes posted elements, assigning ids and a fresh read stamp.
    pub fn echo_elements() -> impl Fn(Option<&Value>) -> Result<Value, TransportError> + Send + Sync {
        |body: Option<&Value>| {
            let mut items = body
                .and_then(|b| b.get("elements"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for item in items.iter_mut() {
                if let Some(obj) = item.as_object_mut() {
                    if obj.get("sysmlid").map_or(true, Value::is_null) {
                        obj.insert("sysmlid".to_string(), json!(uuid::Uuid::now_v7().to_string()));
                    }
                    obj.insert("read".to_string(), json!("2015-06-01T00:00:00.000-0700"));
                }
            }
            Ok(json!({ "elements": items }))
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over the MMS error taxonomy.

    use super::*;

    /// Assert that the result failed with the given HTTP status.
    #[track_caller]
    pub fn assert_status<T: std::fmt::Debug>(result: &MmsResult<T>, status: u16) {
        match result {
            Err(err) => assert_eq!(err.status(), Some(status), "wrong status in {:?}", err),
            Ok(value) => panic!("Expected status {}, got Ok: {:?}", status, value),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &MmsResult<T>) {
        match result {
            Err(MmsError::Conflict(failure)) => assert_eq!(failure.message, "Conflict"),
            other => panic!("Expected Conflict, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation<T: std::fmt::Debug>(result: &MmsResult<T>) {
        match result {
            Err(MmsError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that two handles are the same cached entry, not copies.
    #[track_caller]
    pub fn assert_same_entry(a: &EntryHandle, b: &EntryHandle) {
        assert!(a.ptr_eq(b), "Expected the same cached entry, got distinct handles");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_sticky_reply_repeats() {
        let mock = MockTransport::new();
        mock.on_get("u", json!({"a": 1}));
        assert_eq!(mock.get("u").await.unwrap(), json!({"a": 1}));
        assert_eq!(mock.get("u").await.unwrap(), json!({"a": 1}));
        assert_eq!(mock.get_count("u"), 2);
    }

    #[tokio::test]
    async fn test_queue_drains_before_sticky() {
        let mock = MockTransport::new();
        mock.enqueue_post("u", Err(TransportError::new(409, json!({}))))
            .on_post("u", json!({"ok": true}));
        assert_eq!(mock.post("u", None).await.unwrap_err().status, 409);
        assert_eq!(mock.post("u", None).await.unwrap(), json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_unscripted_url_is_404() {
        let mock = MockTransport::new();
        assert_eq!(mock.get("nowhere").await.unwrap_err().status, 404);
    }

    #[tokio::test]
    async fn test_posted_bodies_recorded() {
        let mock = MockTransport::new();
        mock.respond_post("u", fixtures::echo_elements());
        let body = json!({"elements": [{"name": "n"}]});
        let reply = mock.post("u", Some(&body)).await.unwrap();
        assert!(reply["elements"][0]["sysmlid"].is_string());
        assert_eq!(mock.posted_bodies("u"), vec![body]);
    }

    #[tokio::test]
    async fn test_hold_parks_requests() {
        let mock = Arc::new(MockTransport::new());
        mock.on_get("u", json!(1));
        mock.hold();
        let task = {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move { mock.get("u").await })
        };
        while mock.get_count("u") == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());
        mock.release();
        assert_eq!(task.await.unwrap().unwrap(), json!(1));
    }

    #[test]
    fn test_fixtures_shapes() {
        assert!(mms_core::is_partially_hydrated(&fixtures::partial_view("v", "V")));
        assert!(!mms_core::is_partially_hydrated(&fixtures::view("v", "V")));
        assert_eq!(fixtures::elements(vec![json!(1)]), json!({"elements": [1]}));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_generated_ids_have_no_delimiter(id in generators::arb_element_id()) {
            prop_assert!(!id.contains(mms_core::KEY_DELIMITER));
        }

        #[test]
        fn prop_generated_containers_are_hydrated(elem in generators::arb_element()) {
            prop_assert!(!mms_core::is_partially_hydrated(&elem));
        }
    }
}
