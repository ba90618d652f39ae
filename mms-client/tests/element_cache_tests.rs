//! Cache behaviour of element reads.
//!
//! - Identity: repeated reads return the same entry with one backend call
//! - De-duplication: concurrent reads share one in-flight request
//! - Merge: a forced refresh updates the entry already handed out
//! - Partially hydrated containers are refetched
//! - Edit copies are isolated from the canonical entry

use mms_client::Session;
use mms_core::{MmsError, RequestOptions};
use mms_test_utils::{assertions::*, fixtures, generators::*, MockTransport};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[path = "support/session.rs"]
mod test_session_support;
use test_session_support::{element_url, test_session, urls};

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// IDENTITY AND DE-DUPLICATION
// ============================================================================

#[tokio::test]
async fn test_repeated_reads_return_same_entry() {
    let (session, mock) = test_session();
    mock.on_get(&element_url("a"), fixtures::elements(vec![fixtures::element("a", "A")]));

    let first = session.elements().get_element("a", &RequestOptions::new()).await.unwrap();
    let second = session.elements().get_element("a", &RequestOptions::new()).await.unwrap();

    assert_same_entry(&first, &second);
    assert_eq!(mock.get_count(&element_url("a")), 1);
    assert_eq!(first.snapshot()["name"], json!("A"));
}

#[tokio::test]
async fn test_concurrent_reads_share_one_request() {
    let (session, mock) = test_session();
    mock.on_get(&element_url("a"), fixtures::elements(vec![fixtures::element("a", "A")]));
    mock.hold();

    let options = RequestOptions::new();
    let release = async {
        while mock.total_calls() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        mock.release();
    };
    let (first, second, ()) = tokio::join!(
        session.elements().get_element("a", &options),
        session.elements().get_element("a", &options),
        release,
    );

    assert_same_entry(&first.unwrap(), &second.unwrap());
    assert_eq!(mock.get_count(&element_url("a")), 1);
}

#[tokio::test]
async fn test_concurrent_failure_reaches_every_caller() {
    let (session, mock) = test_session();
    mock.fail_get(&element_url("a"), 500, json!({"message": "boom"}));
    mock.hold();

    let options = RequestOptions::new();
    let release = async {
        while mock.total_calls() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        mock.release();
    };
    let (first, second, ()) = tokio::join!(
        session.elements().get_element("a", &options),
        session.elements().get_element("a", &options),
        release,
    );

    assert_status(&first, 500);
    assert_status(&second, 500);
    assert_eq!(mock.get_count(&element_url("a")), 1);

    // The failed request is deregistered; the next read goes out again.
    let _ = session.elements().get_element("a", &options).await;
    assert_eq!(mock.get_count(&element_url("a")), 2);
}

#[tokio::test]
async fn test_workspace_and_version_are_distinct_entries() {
    let (session, mock) = test_session();
    let u = urls();
    mock.on_get(&u.element("a", "master", "latest"), fixtures::elements(vec![fixtures::element("a", "A")]));
    mock.on_get(&u.element("a", "ws1", "latest"), fixtures::elements(vec![fixtures::element("a", "A ws1")]));
    mock.on_get(&u.element("a", "master", "3"), fixtures::elements(vec![fixtures::element("a", "A v3")]));

    let master = session.elements().get_element("a", &RequestOptions::new()).await.unwrap();
    let ws1 = session
        .elements()
        .get_element("a", &RequestOptions::new().workspace("ws1"))
        .await
        .unwrap();
    let v3 = session
        .elements()
        .get_element("a", &RequestOptions::new().version("3"))
        .await
        .unwrap();

    assert!(!master.ptr_eq(&ws1));
    assert!(!master.ptr_eq(&v3));
    assert_eq!(ws1.snapshot()["name"], json!("A ws1"));
    assert_eq!(v3.snapshot()["name"], json!("A v3"));
}

// ============================================================================
// MERGE AND REFRESH
// ============================================================================

#[tokio::test]
async fn test_forced_refresh_merges_into_existing_entry() {
    let (session, mock) = test_session();
    let url = element_url("a");
    mock.enqueue_get(&url, Ok(fixtures::elements(vec![fixtures::element("a", "A")])));
    mock.on_get(&url, fixtures::elements(vec![json!({"sysmlid": "a", "name": "A2"})]));

    let held = session.elements().get_element("a", &RequestOptions::new()).await.unwrap();
    let refreshed = session
        .elements()
        .get_element("a", &RequestOptions::new().force(true))
        .await
        .unwrap();

    assert_same_entry(&held, &refreshed);
    let value = held.snapshot();
    assert_eq!(value["name"], json!("A2"));
    // Fields absent from the refresh survive the merge.
    assert_eq!(value["creator"], json!("admin"));
    assert_eq!(mock.get_count(&url), 2);
}

#[tokio::test]
async fn test_partially_hydrated_view_is_refetched() {
    let (session, mock) = test_session();
    let list_url = urls().view_elements("doc", "latest");
    mock.on_get(&list_url, fixtures::elements(vec![fixtures::partial_view("v1", "View 1")]));
    mock.on_get(&element_url("v1"), fixtures::elements(vec![fixtures::view("v1", "View 1")]));

    let seeded = session
        .elements()
        .get_generic_elements(&list_url, "elements", &RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(seeded.len(), 1);

    let full = session.elements().get_element("v1", &RequestOptions::new()).await.unwrap();
    assert_same_entry(&seeded[0], &full);
    assert!(full.snapshot()["specialization"].get("contains").is_some());
    assert_eq!(mock.get_count(&element_url("v1")), 1);

    session.elements().get_element("v1", &RequestOptions::new()).await.unwrap();
    assert_eq!(mock.get_count(&element_url("v1")), 1);
}

#[tokio::test]
async fn test_list_with_anonymous_entry_caches_nothing() {
    let (session, mock) = test_session();
    let list_url = urls().view_elements("v1", "latest");
    mock.on_get(
        &list_url,
        fixtures::elements(vec![fixtures::element("e1", "First"), json!({"name": "anonymous"})]),
    );

    let result = session
        .elements()
        .get_generic_elements(&list_url, "elements", &RequestOptions::new())
        .await;

    assert!(matches!(result, Err(MmsError::Malformed { .. })));
    assert!(session.store().is_empty());
}

#[tokio::test]
async fn test_fetched_elements_are_cleaned() {
    let (session, mock) = test_session();
    mock.on_get(
        &element_url("p"),
        fixtures::elements(vec![fixtures::property("p", json!("not a list"))]),
    );

    let property = session.elements().get_element("p", &RequestOptions::new()).await.unwrap();
    assert_eq!(property.snapshot()["specialization"]["value"], json!([]));
}

// ============================================================================
// FAN-OUT READS
// ============================================================================

#[tokio::test]
async fn test_get_elements_preserves_order() {
    let (session, mock) = test_session();
    mock.on_get(&element_url("a"), fixtures::elements(vec![fixtures::element("a", "A")]));
    mock.on_get(&element_url("b"), fixtures::elements(vec![fixtures::element("b", "B")]));

    let handles = session
        .elements()
        .get_elements(&["b", "a"], &RequestOptions::new())
        .await
        .unwrap();
    let names: Vec<_> = handles.iter().map(|h| h.snapshot()["name"].clone()).collect();
    assert_eq!(names, vec![json!("B"), json!("A")]);
}

#[tokio::test]
async fn test_get_elements_fails_when_any_fails() {
    let (session, mock) = test_session();
    mock.on_get(&element_url("a"), fixtures::elements(vec![fixtures::element("a", "A")]));

    let result = session
        .elements()
        .get_elements(&["a", "missing"], &RequestOptions::new())
        .await;
    assert!(matches!(result, Err(MmsError::NotFound(_))));
    assert_status(&result, 404);
}

#[tokio::test]
async fn test_versions_are_cached() {
    let (session, mock) = test_session();
    let url = urls().element_versions("a");
    mock.on_get(&url, json!({"versions": [{"label": "1"}, {"label": "2"}]}));

    let first = session.elements().get_element_versions("a", false, None).await.unwrap();
    let second = session.elements().get_element_versions("a", false, None).await.unwrap();
    assert_same_entry(&first, &second);
    assert_eq!(first.snapshot().as_array().map(Vec::len), Some(2));
    assert_eq!(mock.get_count(&url), 1);
}

#[tokio::test]
async fn test_search_caches_each_hit() {
    let (session, mock) = test_session();
    let url = urls().element_search("pump");
    mock.on_get(&url, fixtures::elements(vec![fixtures::element("s1", "Pump")]));

    let hits = session.elements().search("pump", false, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    let cached = session.elements().get_element("s1", &RequestOptions::new()).await.unwrap();
    assert_same_entry(&hits[0], &cached);
    assert_eq!(mock.get_count(&element_url("s1")), 0);
}

// ============================================================================
// EDIT COPIES
// ============================================================================

#[tokio::test]
async fn test_edit_copy_is_isolated() {
    let (session, mock) = test_session();
    mock.on_get(
        &element_url("d"),
        fixtures::elements(vec![fixtures::product("d", "Doc", json!([{"id": "d", "childrenViews": []}]))]),
    );

    let canonical = session.elements().get_element("d", &RequestOptions::new()).await.unwrap();
    let edit = session.elements().get_element_for_edit("d", false, None).await.unwrap();
    assert!(!edit.ptr_eq(&canonical));

    let spec = edit.snapshot()["specialization"].clone();
    assert!(spec.get("contains").is_none());
    assert!(spec.get("view2view").is_none());
    assert!(canonical.snapshot()["specialization"].get("view2view").is_some());

    edit.update(|v| v["name"] = json!("Draft"));
    assert_eq!(canonical.snapshot()["name"], json!("Doc"));
    assert!(session.elements().is_dirty("d", None));

    let again = session.elements().get_element_for_edit("d", false, None).await.unwrap();
    assert_same_entry(&edit, &again);
    assert_eq!(mock.get_count(&element_url("d")), 1);
}

#[tokio::test]
async fn test_session_clear_drops_entries() {
    let (session, mock) = test_session();
    mock.on_get(&element_url("a"), fixtures::elements(vec![fixtures::element("a", "A")]));

    session.elements().get_element("a", &RequestOptions::new()).await.unwrap();
    assert!(!session.store().is_empty());
    session.clear();
    assert!(session.store().is_empty());

    session.elements().get_element("a", &RequestOptions::new()).await.unwrap();
    assert_eq!(mock.get_count(&element_url("a")), 2);
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Any element read twice through the same session hits the backend once.
    #[test]
    fn prop_second_read_is_cached(element in arb_element(), workspace in arb_workspace()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let mock = Arc::new(MockTransport::new());
            let session = Session::new(mock.clone(), fixtures::test_config());
            let id = element["sysmlid"].as_str().unwrap_or_default().to_string();
            let url = urls().element(&id, &workspace, "latest");
            mock.on_get(&url, fixtures::elements(vec![element.clone()]));

            let options = RequestOptions::new().workspace(workspace.clone());
            let first = session.elements().get_element(&id, &options).await
                .map_err(|e| TestCaseError::fail(format!("first read failed: {}", e)))?;
            let second = session.elements().get_element(&id, &options).await
                .map_err(|e| TestCaseError::fail(format!("second read failed: {}", e)))?;

            prop_assert!(first.ptr_eq(&second));
            prop_assert_eq!(mock.get_count(&url), 1);
            prop_assert_eq!(first.snapshot()["name"].clone(), element["name"].clone());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
