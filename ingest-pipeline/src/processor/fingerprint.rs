//! Fingerprint derivation.
//!
//! Key-derived and content-derived digests use different domain prefixes so
//! a payload can never collide with a declared key by construction.

use sha3::{Digest, Sha3_256};

use crate::errors::PipelineError;
use ingest_shared::{Fingerprint, RawDocument};

const KEY_DOMAIN: &[u8] = b"ingest:key:v1";
const CONTENT_DOMAIN: &[u8] = b"ingest:content:v1";

/// Derives stable identity keys from raw documents.
///
/// Only the declared key (or, absent one, the payload) is hashed. The
/// retrieval timestamp and origin never contribute, so re-fetches of the same
/// logical document map to the same fingerprint.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fingerprinter;

impl Fingerprinter {
    pub fn new() -> Self {
        Self
    }

    /// Compute the fingerprint of a document.
    ///
    /// # Returns
    ///
    /// * `Ok(Fingerprint)` - Hex SHA3-256 digest
    /// * `Err(PipelineError::MalformedDocument)` - No usable key and no content
    pub fn fingerprint(&self, document: &RawDocument) -> Result<Fingerprint, PipelineError> {
        let mut hasher = Sha3_256::new();

        if let Some(key) = document.usable_key() {
            hasher.update(KEY_DOMAIN);
            hasher.update([0u8]);
            hasher.update(key.url.trim().as_bytes());
            hasher.update([0u8]);
            if let Some(published_at) = &key.published_at {
                hasher.update(published_at.trim().as_bytes());
            }
        } else if !document.payload.is_empty() {
            hasher.update(CONTENT_DOMAIN);
            hasher.update([0u8]);
            hasher.update(&document.payload);
        } else {
            return Err(PipelineError::malformed(
                "document has neither a unique key nor content",
            ));
        }

        Ok(Fingerprint::from_hex(hex::encode(hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ingest_shared::DeclaredKey;

    #[test]
    fn test_same_key_same_fingerprint() {
        let fingerprinter = Fingerprinter::new();
        let a = RawDocument::keyed("argos", "http://x/1", "2024-01-01", "first payload");
        let b = RawDocument::keyed("other-feed", "http://x/1", "2024-01-01", "second payload")
            .with_retrieved_at(Utc::now() - Duration::days(3));

        assert_eq!(
            fingerprinter.fingerprint(&a).unwrap(),
            fingerprinter.fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn test_key_is_trimmed() {
        let fingerprinter = Fingerprinter::new();
        let a = RawDocument::keyed("feed", "http://x/1", "2024-01-01", "p");
        let b = RawDocument::keyed("feed", "  http://x/1 ", " 2024-01-01", "p");
        assert_eq!(
            fingerprinter.fingerprint(&a).unwrap(),
            fingerprinter.fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn test_distinct_keys_differ() {
        let fingerprinter = Fingerprinter::new();
        let a = RawDocument::keyed("feed", "http://x/1", "2024-01-01", "p");
        let b = RawDocument::keyed("feed", "http://x/1", "2024-01-02", "p");
        let c = RawDocument::keyed("feed", "http://x/2", "2024-01-01", "p");

        let fa = fingerprinter.fingerprint(&a).unwrap();
        assert_ne!(fa, fingerprinter.fingerprint(&b).unwrap());
        assert_ne!(fa, fingerprinter.fingerprint(&c).unwrap());
        assert_eq!(fa.as_str().len(), 64);
    }

    #[test]
    fn test_content_fallback() {
        let fingerprinter = Fingerprinter::new();
        let a = RawDocument::new("feed", None, b"same body".to_vec());
        let b = RawDocument::new("other", None, b"same body".to_vec());
        let c = RawDocument::new("feed", None, b"other body".to_vec());

        assert_eq!(
            fingerprinter.fingerprint(&a).unwrap(),
            fingerprinter.fingerprint(&b).unwrap()
        );
        assert_ne!(
            fingerprinter.fingerprint(&a).unwrap(),
            fingerprinter.fingerprint(&c).unwrap()
        );
    }

    #[test]
    fn test_blank_key_falls_back_to_content() {
        let fingerprinter = Fingerprinter::new();
        let keyed_blank = RawDocument::new(
            "feed",
            Some(DeclaredKey::new(" ", None)),
            b"body".to_vec(),
        );
        let unkeyed = RawDocument::new("feed", None, b"body".to_vec());
        assert_eq!(
            fingerprinter.fingerprint(&keyed_blank).unwrap(),
            fingerprinter.fingerprint(&unkeyed).unwrap()
        );
    }

    #[test]
    fn test_no_key_no_content_is_malformed() {
        let fingerprinter = Fingerprinter::new();
        let doc = RawDocument::new("feed", None, Vec::new());
        assert!(matches!(
            fingerprinter.fingerprint(&doc),
            Err(PipelineError::MalformedDocument(_))
        ));
    }
}
