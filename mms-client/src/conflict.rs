//! Optimistic-concurrency conflict resolution.
//!
//! A 409 on update carries the server's current copy of the element. When
//! that copy matches the cached baseline in everything but the volatile
//! fields, only the read stamp raced and the update can be replayed with the
//! server's stamp. Any other difference is a real conflict for the caller.

use mms_core::{clean_element, strip_volatile, HttpFailure, READ_FIELD};
use serde_json::Value;

/// Outcome of inspecting a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Replay the update once with this read stamp.
    Retry { read: Value },
    /// Surface the conflict unchanged.
    Propagate,
}

/// Decides between auto-retry and propagation for a 409 on update.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Compare the server copy in `failure` against the cached `baseline`.
    ///
    /// Propagates when the payload has no server element or no read stamp,
    /// or when there is no baseline to compare against.
    pub fn resolve(&self, failure: &HttpFailure, baseline: Option<&Value>) -> Resolution {
        let Some(server) = failure
            .data
            .get("elements")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
        else {
            return Resolution::Propagate;
        };
        let Some(read) = server.get(READ_FIELD).filter(|r| !r.is_null()).cloned() else {
            return Resolution::Propagate;
        };
        let Some(baseline) = baseline else {
            return Resolution::Propagate;
        };

        if comparable(server) == comparable(baseline) {
            Resolution::Retry { read }
        } else {
            Resolution::Propagate
        }
    }
}

/// Copy of `element` without volatile fields, cleaned for display.
fn comparable(element: &Value) -> Value {
    let mut copy = element.clone();
    strip_volatile(&mut copy);
    clean_element(&mut copy, false);
    copy
}
