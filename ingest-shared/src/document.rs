//! Raw document types.
//!
//! A `RawDocument` is what a producer hands to the ingestion queue. It is never
//! modified after it has been enqueued; the pipeline shares it behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The unique key a producer declares for a document, when it has one.
///
/// For news articles this is the canonical URL plus the publish date. Two
/// fetches of the same article carry the same key even if their payloads
/// differ (e.g. a re-rendered page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredKey {
    /// Canonical URL of the document.
    pub url: String,
    /// Publish date or timestamp as declared by the source.
    pub published_at: Option<String>,
}

impl DeclaredKey {
    /// Create a key from a URL and an optional publish date.
    pub fn new(url: impl Into<String>, published_at: Option<String>) -> Self {
        Self {
            url: url.into(),
            published_at,
        }
    }

    /// A key whose URL is blank carries no identity.
    pub fn is_usable(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// An opaque payload plus the metadata needed to route and deduplicate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Identifier assigned when the document is created. Stays the same when
    /// an operator resubmits the document.
    pub document_id: Uuid,
    /// Identifier of the producer or upstream source.
    pub origin: String,
    /// When the producer fetched the document.
    pub retrieved_at: DateTime<Utc>,
    /// Declared unique key, if the source provides one.
    pub key: Option<DeclaredKey>,
    /// The document body, uninterpreted by the queue.
    pub payload: Vec<u8>,
}

impl RawDocument {
    /// Create a new document retrieved now.
    pub fn new(origin: impl Into<String>, key: Option<DeclaredKey>, payload: Vec<u8>) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            origin: origin.into(),
            retrieved_at: Utc::now(),
            key,
            payload,
        }
    }

    /// Create a keyed document from a URL and publish date.
    pub fn keyed(
        origin: impl Into<String>,
        url: impl Into<String>,
        published_at: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(
            origin,
            Some(DeclaredKey::new(url, Some(published_at.into()))),
            payload.into(),
        )
    }

    /// Override the retrieval timestamp.
    pub fn with_retrieved_at(mut self, retrieved_at: DateTime<Utc>) -> Self {
        self.retrieved_at = retrieved_at;
        self
    }

    /// The declared key, if present and usable.
    pub fn usable_key(&self) -> Option<&DeclaredKey> {
        self.key.as_ref().filter(|k| k.is_usable())
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_is_not_usable() {
        let doc = RawDocument::new(
            "feed",
            Some(DeclaredKey::new("   ", Some("2024-01-01".to_string()))),
            b"body".to_vec(),
        );
        assert!(doc.usable_key().is_none());
    }

    #[test]
    fn test_keyed_document() {
        let doc = RawDocument::keyed("feed", "http://x/1", "2024-01-01", "hello");
        let key = doc.usable_key().unwrap();
        assert_eq!(key.url, "http://x/1");
        assert_eq!(key.published_at.as_deref(), Some("2024-01-01"));
        assert_eq!(doc.payload_len(), 5);
    }

    #[test]
    fn test_serde_keeps_identity() {
        let doc = RawDocument::keyed("feed", "http://x/1", "2024-01-01", "hello");
        let json = serde_json::to_string(&doc).unwrap();
        let back: RawDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
