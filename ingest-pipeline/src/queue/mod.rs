//! Ingestion queue.
//!
//! A bounded multi-producer buffer between producers and the pipeline
//! workers. Producers either wait for space (`enqueue`) or get the document
//! back with `QueueError::Full` (`try_enqueue`); nothing is dropped inside the
//! queue. Workers share one `QueueConsumer` and pull from it.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;
use uuid::Uuid;

use crate::errors::{PipelineError, QueueError};
use ingest_shared::RawDocument;

/// How a producer wants to be told about a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnqueueMode {
    /// Wait until there is space.
    #[default]
    Blocking,
    /// Return `QueueError::Full` immediately.
    NonBlocking,
}

/// Acknowledgement that a document is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub document_id: Uuid,
}

/// Create a queue holding at most `capacity` documents.
///
/// # Returns
///
/// * `Ok((QueueProducer, QueueConsumer))` - The two ends of the queue
/// * `Err(PipelineError::ConfigError)` - If `capacity` is zero
pub fn bounded(capacity: usize) -> Result<(QueueProducer, QueueConsumer), PipelineError> {
    if capacity == 0 {
        return Err(PipelineError::config("queue capacity must be at least 1"));
    }

    let (sender, receiver) = mpsc::channel(capacity);
    Ok((
        QueueProducer { sender },
        QueueConsumer {
            receiver: Arc::new(Mutex::new(receiver)),
        },
    ))
}

/// Producer handle. Clone one per producer; intake closes once every handle
/// has been dropped.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    sender: mpsc::Sender<Arc<RawDocument>>,
}

impl QueueProducer {
    /// Enqueue, waiting for space if the queue is full.
    pub async fn enqueue(&self, document: impl Into<Arc<RawDocument>>) -> Result<Ack, QueueError> {
        let document = document.into();
        let document_id = document.document_id;

        self.sender
            .send(document)
            .await
            .map_err(|mpsc::error::SendError(doc)| QueueError::Closed(doc))?;

        trace!(document_id = %document_id, "Enqueued document");
        Ok(Ack { document_id })
    }

    /// Enqueue without waiting. A full queue hands the document back.
    pub fn try_enqueue(&self, document: impl Into<Arc<RawDocument>>) -> Result<Ack, QueueError> {
        let document = document.into();
        let document_id = document.document_id;

        self.sender.try_send(document).map_err(|e| match e {
            mpsc::error::TrySendError::Full(doc) => QueueError::Full(doc),
            mpsc::error::TrySendError::Closed(doc) => QueueError::Closed(doc),
        })?;

        trace!(document_id = %document_id, "Enqueued document");
        Ok(Ack { document_id })
    }

    /// Enqueue in the given mode.
    pub async fn submit(
        &self,
        document: impl Into<Arc<RawDocument>>,
        mode: EnqueueMode,
    ) -> Result<Ack, QueueError> {
        match mode {
            EnqueueMode::Blocking => self.enqueue(document).await,
            EnqueueMode::NonBlocking => self.try_enqueue(document),
        }
    }

    /// Number of buffered documents.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured bound.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

/// Consumer handle shared by the pipeline workers.
#[derive(Debug, Clone)]
pub struct QueueConsumer {
    receiver: Arc<Mutex<mpsc::Receiver<Arc<RawDocument>>>>,
}

impl QueueConsumer {
    /// Wait for the next document.
    ///
    /// Returns `None` once intake is closed and the buffer is drained.
    /// Cancel safe: a dropped call never loses a document.
    pub async fn dequeue(&self) -> Option<Arc<RawDocument>> {
        self.receiver.lock().await.recv().await
    }

    /// Close intake and take every document still buffered.
    ///
    /// Later enqueues, including ones already waiting for space, fail with
    /// `QueueError::Closed`. Waits for any pending `dequeue` to return, so
    /// call it once the workers have stopped.
    pub async fn close(&self) -> Vec<Arc<RawDocument>> {
        let mut receiver = self.receiver.lock().await;
        receiver.close();

        let mut remaining = Vec::new();
        while let Ok(document) = receiver.try_recv() {
            remaining.push(document);
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn doc(n: usize) -> RawDocument {
        RawDocument::keyed("feed", format!("http://x/{}", n), "2024-01-01", "body")
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(bounded(0), Err(PipelineError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_non_blocking_full_returns_document() {
        let (producer, _consumer) = bounded(2).unwrap();

        producer.try_enqueue(doc(1)).unwrap();
        producer.try_enqueue(doc(2)).unwrap();
        let third = doc(3);
        let third_id = third.document_id;

        let err = producer.try_enqueue(third).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_document().document_id, third_id);
        assert_eq!(producer.len(), 2);
        assert_eq!(producer.capacity(), 2);
    }

    #[tokio::test]
    async fn test_submit_non_blocking_mode() {
        let (producer, _consumer) = bounded(1).unwrap();
        producer.submit(doc(1), EnqueueMode::NonBlocking).await.unwrap();
        let err = producer
            .submit(doc(2), EnqueueMode::NonBlocking)
            .await
            .unwrap_err();
        assert!(err.is_full());
    }

    #[tokio::test]
    async fn test_blocking_enqueue_waits_for_space() {
        let (producer, consumer) = bounded(1).unwrap();
        producer.enqueue(doc(1)).await.unwrap();

        let blocked = {
            let producer = producer.clone();
            tokio::spawn(async move { producer.enqueue(doc(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        consumer.dequeue().await.unwrap();
        blocked.await.unwrap().unwrap();
        assert_eq!(producer.len(), 1);
    }

    #[tokio::test]
    async fn test_close_returns_buffered_documents() {
        let (producer, consumer) = bounded(2).unwrap();
        producer.enqueue(doc(1)).await.unwrap();
        producer.enqueue(doc(2)).await.unwrap();

        let blocked = {
            let producer = producer.clone();
            tokio::spawn(async move { producer.enqueue(doc(3)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let remaining = consumer.close().await;
        assert_eq!(remaining.len(), 2);
        assert!(matches!(blocked.await.unwrap(), Err(QueueError::Closed(_))));
        assert!(matches!(producer.try_enqueue(doc(4)), Err(QueueError::Closed(_))));
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_ends_when_producers_dropped() {
        let (producer, consumer) = bounded(4).unwrap();
        producer.enqueue(doc(1)).await.unwrap();
        drop(producer);

        assert!(consumer.dequeue().await.is_some());
        assert!(consumer.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_after_consumer_dropped_is_closed() {
        let (producer, consumer) = bounded(4).unwrap();
        drop(consumer);
        let err = producer.enqueue(doc(1)).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_producers_no_loss_no_duplication() {
        let (producer, consumer) = bounded(8).unwrap();
        let producers = 4;
        let per_producer = 50;

        for p in 0..producers {
            let producer = producer.clone();
            tokio::spawn(async move {
                for i in 0..per_producer {
                    producer.enqueue(doc(p * 1000 + i)).await.unwrap();
                }
            });
        }
        drop(producer);

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let consumer = consumer.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(doc) = consumer.dequeue().await {
                        seen.push(doc.document_id);
                    }
                    seen
                })
            })
            .collect();
        drop(consumer);

        let mut all = Vec::new();
        for handle in consumers {
            all.extend(handle.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), producers * per_producer);
        assert_eq!(unique.len(), all.len());
    }
}
