//! Standard validation rules.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::warn;

use crate::processor::validator::{Rule, RuleVerdict};
use ingest_shared::{RawDocument, Reason};

/// Rejects payloads larger than `max_bytes`.
#[derive(Debug, Clone)]
pub struct PayloadSizeRule {
    max_bytes: usize,
}

impl PayloadSizeRule {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Rule for PayloadSizeRule {
    fn name(&self) -> &'static str {
        "payload_size"
    }

    fn evaluate(&self, document: &RawDocument) -> RuleVerdict {
        let len = document.payload_len();
        if len > self.max_bytes {
            return RuleVerdict::Fail(Reason::new(
                "size",
                format!("payload is {} bytes, limit is {}", len, self.max_bytes),
            ));
        }
        RuleVerdict::Pass
    }
}

/// Quarantines payloads that are not clean UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingRule;

impl Rule for EncodingRule {
    fn name(&self) -> &'static str {
        "encoding"
    }

    fn evaluate(&self, document: &RawDocument) -> RuleVerdict {
        match std::str::from_utf8(&document.payload) {
            Err(e) => RuleVerdict::Quarantine(Reason::new(
                "encoding",
                format!("invalid UTF-8 at byte {}", e.valid_up_to()),
            )),
            Ok(text) if text.contains('\0') => {
                RuleVerdict::Quarantine(Reason::new("encoding", "payload contains NUL bytes"))
            }
            Ok(_) => RuleVerdict::Pass,
        }
    }
}

/// Rejects documents missing required metadata or payload fields.
///
/// With no configured fields only the origin and a non-empty payload are
/// required. Otherwise the payload must be a JSON object carrying every
/// field with a non-null value.
#[derive(Debug, Clone, Default)]
pub struct RequiredFieldsRule {
    fields: Vec<String>,
}

impl RequiredFieldsRule {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }
}

impl Rule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "required_fields"
    }

    fn evaluate(&self, document: &RawDocument) -> RuleVerdict {
        if document.origin.trim().is_empty() {
            return RuleVerdict::Fail(Reason::new("missing_fields", "origin is required"));
        }
        if document.payload.is_empty() {
            return RuleVerdict::Fail(Reason::new("missing_fields", "payload is empty"));
        }
        if self.fields.is_empty() {
            return RuleVerdict::Pass;
        }

        let object = match serde_json::from_slice::<serde_json::Value>(&document.payload) {
            Ok(serde_json::Value::Object(object)) => object,
            Ok(_) => {
                return RuleVerdict::Fail(Reason::new(
                    "missing_fields",
                    "payload is not a JSON object",
                ))
            }
            Err(e) => {
                return RuleVerdict::Fail(Reason::new(
                    "missing_fields",
                    format!("payload is not JSON: {}", e),
                ))
            }
        };

        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| object.get(field.as_str()).map_or(true, |v| v.is_null()))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            RuleVerdict::Pass
        } else {
            RuleVerdict::Fail(Reason::new("missing_fields", missing.join(",")))
        }
    }
}

/// Quarantines documents from origins outside the allow-list.
#[derive(Debug, Clone, Default)]
pub struct SourceAllowListRule {
    allowed: HashSet<String>,
}

impl SourceAllowListRule {
    /// An empty set allows every origin.
    pub fn new(allowed: HashSet<String>) -> Self {
        Self { allowed }
    }
}

impl Rule for SourceAllowListRule {
    fn name(&self) -> &'static str {
        "source_allow_list"
    }

    fn evaluate(&self, document: &RawDocument) -> RuleVerdict {
        if self.allowed.is_empty() || self.allowed.contains(&document.origin) {
            RuleVerdict::Pass
        } else {
            RuleVerdict::Quarantine(Reason::new(
                "source",
                format!("origin '{}' is not allow-listed", document.origin),
            ))
        }
    }
}

/// A model-serving call that classifies a document (e.g. a relevance or
/// spam model). Implementations may block.
pub trait ModelClassifier: Send + Sync + 'static {
    fn classify(&self, document: &RawDocument) -> RuleVerdict;
}

/// Default cap on concurrently running classifier threads.
pub const DEFAULT_MAX_MODEL_THREADS: usize = 16;

/// Runs a `ModelClassifier` with a deadline.
///
/// The classifier runs on its own thread; if it has not answered within
/// `timeout` the document is quarantined with `model_timeout` and the late
/// answer is discarded. A timed-out thread keeps running until the
/// classifier returns, so at most `max_threads` classifier threads exist at
/// once. While all of them are busy, documents are quarantined with
/// `model_busy` without calling the classifier.
pub struct ModelCheckRule {
    classifier: Arc<dyn ModelClassifier>,
    timeout: Duration,
    max_threads: usize,
    running: Arc<AtomicUsize>,
}

impl ModelCheckRule {
    pub fn new(classifier: Arc<dyn ModelClassifier>, timeout: Duration) -> Self {
        Self {
            classifier,
            timeout,
            max_threads: DEFAULT_MAX_MODEL_THREADS,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Classifier threads currently alive, timed-out ones included.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> Option<ThreadSlot> {
        self.running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_threads).then_some(n + 1)
            })
            .ok()
            .map(|_| ThreadSlot(self.running.clone()))
    }
}

/// Frees one classifier thread slot when dropped.
struct ThreadSlot(Arc<AtomicUsize>);

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Rule for ModelCheckRule {
    fn name(&self) -> &'static str {
        "model_check"
    }

    fn evaluate(&self, document: &RawDocument) -> RuleVerdict {
        let Some(slot) = self.acquire() else {
            warn!(
                document_id = %document.document_id,
                max_threads = self.max_threads,
                "Model check saturated"
            );
            return RuleVerdict::Quarantine(Reason::new(
                "model_busy",
                format!("{} classifier calls still running", self.max_threads),
            ));
        };

        let (tx, rx) = mpsc::sync_channel(1);
        let classifier = self.classifier.clone();
        let owned = document.clone();

        let spawned = std::thread::Builder::new()
            .name("model-check".to_string())
            .spawn(move || {
                let verdict = classifier.classify(&owned);
                drop(slot);
                let _ = tx.send(verdict);
            });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start model check");
            return RuleVerdict::Quarantine(Reason::new("model_error", e.to_string()));
        }

        match rx.recv_timeout(self.timeout) {
            Ok(verdict) => verdict,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    document_id = %document.document_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Model check timed out"
                );
                RuleVerdict::Quarantine(Reason::new(
                    "model_timeout",
                    format!("no answer within {}ms", self.timeout.as_millis()),
                ))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => RuleVerdict::Quarantine(Reason::new(
                "model_error",
                "classifier exited without a verdict",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(origin: &str, payload: &[u8]) -> RawDocument {
        RawDocument::keyed(origin, "http://x/1", "2024-01-01", payload.to_vec())
    }

    fn code(verdict: RuleVerdict) -> Option<String> {
        match verdict {
            RuleVerdict::Pass => None,
            RuleVerdict::Fail(r) | RuleVerdict::Quarantine(r) => Some(r.code),
        }
    }

    #[test]
    fn test_payload_size_bound_is_inclusive() {
        let rule = PayloadSizeRule::new(4);
        assert_eq!(rule.evaluate(&doc("a", b"1234")), RuleVerdict::Pass);
        assert_eq!(code(rule.evaluate(&doc("a", b"12345"))).as_deref(), Some("size"));
    }

    #[test]
    fn test_encoding_rule() {
        let rule = EncodingRule;
        assert_eq!(rule.evaluate(&doc("a", "héllo".as_bytes())), RuleVerdict::Pass);
        assert!(matches!(
            rule.evaluate(&doc("a", &[0x66, 0xff, 0xfe])),
            RuleVerdict::Quarantine(ref r) if r.is("encoding")
        ));
        assert!(matches!(
            rule.evaluate(&doc("a", b"nul\0byte")),
            RuleVerdict::Quarantine(ref r) if r.is("encoding")
        ));
    }

    #[test]
    fn test_required_fields_without_json_fields() {
        let rule = RequiredFieldsRule::default();
        assert_eq!(rule.evaluate(&doc("a", b"plain")), RuleVerdict::Pass);
        assert!(matches!(rule.evaluate(&doc(" ", b"plain")), RuleVerdict::Fail(_)));
        assert!(matches!(rule.evaluate(&doc("a", b"")), RuleVerdict::Fail(_)));
    }

    #[test]
    fn test_required_fields_lists_missing() {
        let rule = RequiredFieldsRule::new(vec!["title".into(), "url".into(), "body".into()]);
        match rule.evaluate(&doc("a", br#"{"title":"t","url":null}"#)) {
            RuleVerdict::Fail(reason) => {
                assert_eq!(reason.code, "missing_fields");
                assert_eq!(reason.detail, "url,body");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(matches!(rule.evaluate(&doc("a", b"[1,2]")), RuleVerdict::Fail(_)));
    }

    #[test]
    fn test_empty_allow_list_allows_all() {
        let rule = SourceAllowListRule::default();
        assert_eq!(rule.evaluate(&doc("anything", b"x")), RuleVerdict::Pass);
    }

    struct SlowClassifier(Duration);

    impl ModelClassifier for SlowClassifier {
        fn classify(&self, _document: &RawDocument) -> RuleVerdict {
            std::thread::sleep(self.0);
            RuleVerdict::Pass
        }
    }

    struct RejectingClassifier;

    impl ModelClassifier for RejectingClassifier {
        fn classify(&self, _document: &RawDocument) -> RuleVerdict {
            RuleVerdict::Fail(Reason::new("model", "off-topic"))
        }
    }

    #[test]
    fn test_model_check_timeout_quarantines() {
        let rule = ModelCheckRule::new(
            Arc::new(SlowClassifier(Duration::from_millis(500))),
            Duration::from_millis(20),
        );
        assert_eq!(code(rule.evaluate(&doc("a", b"x"))).as_deref(), Some("model_timeout"));
    }

    #[test]
    fn test_model_check_passes_through_verdict() {
        let fast = ModelCheckRule::new(
            Arc::new(SlowClassifier(Duration::from_millis(1))),
            Duration::from_secs(5),
        );
        assert_eq!(fast.evaluate(&doc("a", b"x")), RuleVerdict::Pass);

        let rejecting = ModelCheckRule::new(Arc::new(RejectingClassifier), Duration::from_secs(5));
        assert_eq!(code(rejecting.evaluate(&doc("a", b"x"))).as_deref(), Some("model"));
        assert_eq!(rejecting.running(), 0);
    }

    #[test]
    fn test_model_check_bounds_hung_threads() {
        let rule = ModelCheckRule::new(
            Arc::new(SlowClassifier(Duration::from_millis(300))),
            Duration::from_millis(10),
        )
        .with_max_threads(1);

        assert_eq!(code(rule.evaluate(&doc("a", b"x"))).as_deref(), Some("model_timeout"));
        assert_eq!(rule.running(), 1);
        assert_eq!(code(rule.evaluate(&doc("a", b"y"))).as_deref(), Some("model_busy"));
        assert_eq!(rule.running(), 1);

        // The slot comes back once the hung call returns.
        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(rule.running(), 0);
        assert_eq!(code(rule.evaluate(&doc("a", b"z"))).as_deref(), Some("model_timeout"));
    }
}
