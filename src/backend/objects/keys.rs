/**
 * Object Key Layout
 *
 * Uploaded files are stored as `<groupCode>/<timestamp>-<name>`, where the
 * timestamp is milliseconds since the epoch taken from a monotonic clock so
 * two uploads of the same name never collide and keys sort by upload time.
 */

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::ObjectStoreError;

/// Namespace for uploads that name no group
pub const DEFAULT_NAMESPACE: &str = "general";

/// Strictly increasing millisecond timestamps
#[derive(Debug, Default)]
pub struct KeyClock {
    last: AtomicU64,
}

impl KeyClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max(now, previous + 1)`
    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, candidate, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Reduce a client-declared file name to its final path component
///
/// Returns `None` when nothing usable is left.
pub fn clean_upload_name(declared: &str) -> Option<String> {
    let last = declared
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." || last.chars().any(char::is_control) {
        return None;
    }
    Some(last.to_string())
}

/// Build the key for an upload into `namespace`
pub fn object_key(namespace: &str, timestamp: u64, name: &str) -> String {
    format!("{}/{}-{}", namespace, timestamp, name)
}

/// The listing prefix for a namespace
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{}/", namespace)
}

/// The name shown to users: the last key segment without its time prefix
///
/// Keys that don't follow the layout are shown as their last segment.
pub fn display_name(key: &str) -> &str {
    let last = key.rsplit('/').next().unwrap_or(key);
    match last.split_once('-') {
        Some((stamp, rest)) if !stamp.is_empty() && !rest.is_empty() && stamp.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => last,
    }
}

/// Reject keys that could escape the store root
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.chars().any(char::is_control)
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
