//! The unit of data flowing through the pipeline.

use std::collections::BTreeMap;

/// A byte payload plus string metadata.
///
/// Processors receive messages by reference and never retain them; output
/// messages are fresh copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    payload: Vec<u8>,
    metadata: BTreeMap<String, String>,
}

/// The output of one processor invocation.
pub type MessageBatch = Vec<Message>;

impl Message {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self { payload: payload.into(), metadata: BTreeMap::new() }
    }

    /// Builder-style metadata setter.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta_set(key, value);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Replace the payload, keeping metadata.
    pub fn set_bytes(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = payload.into();
    }

    pub fn meta_get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn meta_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Deep copy: payload and all metadata.
    pub fn copy(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_preserves_metadata_and_set_bytes_replaces_payload() {
        let original = Message::new("hello").with_meta("source", "stdin");
        let mut out = original.copy();
        out.set_bytes("hi there");

        assert_eq!(out.as_bytes(), b"hi there");
        assert_eq!(out.meta_get("source"), Some("stdin"));
        assert_eq!(original.as_bytes(), b"hello");
    }

    #[test]
    fn missing_meta_is_none() {
        assert_eq!(Message::new("x").meta_get("nope"), None);
    }
}
