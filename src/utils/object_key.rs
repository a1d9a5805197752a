use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::sync::atomic::{AtomicI64, Ordering};

/// Characters left as-is inside one path segment of a public URL.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Builds `prefix/<token>_<name>` storage keys.
///
/// Tokens are millisecond timestamps, bumped forward whenever two keys are
/// requested within the same millisecond, so they are strictly increasing for
/// the lifetime of the generator.
#[derive(Debug, Default)]
pub struct ObjectKeyGenerator {
    last: AtomicI64,
}

impl ObjectKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut previous = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }

    pub fn object_key(&self, prefix: &str, file_name: &str) -> String {
        let name = format!("{}_{}", self.next_token(), sanitize_file_name(file_name));
        join_key(prefix, &name)
    }
}

/// Keeps a user supplied file name from introducing extra key segments.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Public URL of a storage key under `base_url`, encoding each segment.
pub fn public_object_url(base_url: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect();
    format!("{}/{}", base_url.trim_end_matches('/'), encoded.join("/"))
}
