#![allow(dead_code)]

use std::sync::Arc;

use mms_client::{Session, UrlBuilder};
use mms_test_utils::{fixtures, MockTransport};

/// Session over a fresh mock transport, with the mock kept for scripting.
pub fn test_session() -> (Session, Arc<MockTransport>) {
    let mock = Arc::new(MockTransport::new());
    let session = Session::new(mock.clone(), fixtures::test_config());
    (session, mock)
}

pub fn urls() -> UrlBuilder {
    UrlBuilder::new(fixtures::BASE_URL)
}

/// Latest element URL in master.
pub fn element_url(id: &str) -> String {
    urls().element(id, "master", "latest")
}

pub fn post_url() -> String {
    urls().post_elements("master")
}
