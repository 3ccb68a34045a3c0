// crates/dcal-broker/src/source.rs
// ============================================================================
// Module: Claim Sources
// Description: Pluggable sources of raw `claims.submitted` envelopes.
// Purpose: Let the ingestion consumer be backend-agnostic over the broker
//          topic (a message queue, a channel, a file of NDJSON for tests).
// Dependencies: crate::envelope
// ============================================================================

//! ## Overview
//! Mirrors the broker-dispatch split the rest of the workspace uses for
//! outbound delivery: a narrow trait the consumer depends on, with
//! concrete adapters living outside `dcal-core`.

use thiserror::Error;

use crate::envelope::RawEnvelope;

/// Errors raised by a [`ClaimSource`] implementation.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be reached.
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// A message from the source was not valid JSON.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// One polled batch together with the offset to commit once every message
/// in it has been handed to the pipeline or definitively rejected.
pub struct PolledBatch {
    /// Raw envelopes in arrival order.
    pub envelopes: Vec<RawEnvelope>,
    /// Opaque offset identifying the end of this batch.
    pub offset: u64,
}

/// A source of `claims.submitted` envelopes the ingestion consumer polls
/// at a bounded rate.
pub trait ClaimSource: Send + Sync {
    /// Pulls the next batch of envelopes, if any are available.
    ///
    /// # Errors
    /// Returns [`SourceError`] when the source cannot be polled.
    fn poll_batch(&self, max_messages: usize) -> Result<Option<PolledBatch>, SourceError>;

    /// Commits the broker offset, acknowledging every message up to and
    /// including `offset` has been handled.
    ///
    /// # Errors
    /// Returns [`SourceError`] when the commit cannot be durably recorded.
    fn commit(&self, offset: u64) -> Result<(), SourceError>;
}

/// An in-memory source backed by a fixed queue of envelopes, used in tests
/// and local development in place of a real broker client.
pub struct InMemorySource {
    envelopes: std::sync::Mutex<std::collections::VecDeque<RawEnvelope>>,
    committed_offset: std::sync::atomic::AtomicU64,
    next_offset: std::sync::atomic::AtomicU64,
}

impl InMemorySource {
    /// Creates a source pre-loaded with `envelopes`, delivered in order.
    #[must_use]
    pub fn new(envelopes: Vec<RawEnvelope>) -> Self {
        Self {
            envelopes: std::sync::Mutex::new(envelopes.into()),
            committed_offset: std::sync::atomic::AtomicU64::new(0),
            next_offset: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns the last offset successfully committed.
    pub fn committed_offset(&self) -> u64 {
        self.committed_offset.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl ClaimSource for InMemorySource {
    fn poll_batch(&self, max_messages: usize) -> Result<Option<PolledBatch>, SourceError> {
        let mut guard = self.envelopes.lock().map_err(|_| SourceError::Unavailable("source mutex poisoned".to_string()))?;
        if guard.is_empty() {
            return Ok(None);
        }
        let batch: Vec<RawEnvelope> = (0 .. max_messages).filter_map(|_| guard.pop_front()).collect();
        drop(guard);
        let offset = self.next_offset.fetch_add(batch.len() as u64, std::sync::atomic::Ordering::SeqCst) + batch.len() as u64;
        Ok(Some(PolledBatch { envelopes: batch, offset }))
    }

    fn commit(&self, offset: u64) -> Result<(), SourceError> {
        self.committed_offset.store(offset, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// A source backed by an NDJSON file of envelopes, standing in for a real
/// broker endpoint where no message-queue client is configured. Offsets
/// are line numbers, committed to a sidecar `<path>.offset` file so a
/// restarted consumer resumes after the last committed line.
pub struct FileSource {
    envelopes: std::sync::Mutex<std::collections::VecDeque<RawEnvelope>>,
    offset_path: std::path::PathBuf,
    next_offset: std::sync::atomic::AtomicU64,
}

impl FileSource {
    /// Opens the `file://` broker endpoint URI as an NDJSON source,
    /// skipping lines already committed according to the sidecar offset
    /// file, if any.
    ///
    /// # Errors
    /// Returns [`SourceError`] when the URI is not a `file://` URI, the
    /// file cannot be read, or a line is not valid envelope JSON.
    pub fn open(endpoint: &str) -> Result<Self, SourceError> {
        let path = resolve_file_uri(endpoint)?;
        let offset_path = path.with_extension("offset");
        let committed = std::fs::read_to_string(&offset_path)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
            .unwrap_or(0);

        let content = std::fs::read_to_string(path).map_err(|err| SourceError::Unavailable(err.to_string()))?;
        let envelopes = content
            .lines()
            .skip(committed as usize)
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|err| SourceError::Malformed(err.to_string())))
            .collect::<Result<std::collections::VecDeque<RawEnvelope>, SourceError>>()?;

        Ok(Self { envelopes: std::sync::Mutex::new(envelopes), offset_path, next_offset: std::sync::atomic::AtomicU64::new(committed) })
    }
}

/// Resolves a `file://` broker endpoint URI into a local path.
fn resolve_file_uri(endpoint: &str) -> Result<std::path::PathBuf, SourceError> {
    let url = url::Url::parse(endpoint).map_err(|err| SourceError::Unavailable(err.to_string()))?;
    if url.scheme() != "file" {
        return Err(SourceError::Unavailable(format!("unsupported broker endpoint scheme: {}", url.scheme())));
    }
    url.to_file_path().map_err(|()| SourceError::Unavailable("file:// endpoint did not map to a local path".to_string()))
}

impl ClaimSource for FileSource {
    fn poll_batch(&self, max_messages: usize) -> Result<Option<PolledBatch>, SourceError> {
        let mut guard = self.envelopes.lock().map_err(|_| SourceError::Unavailable("source mutex poisoned".to_string()))?;
        if guard.is_empty() {
            return Ok(None);
        }
        let batch: Vec<RawEnvelope> = (0 .. max_messages).filter_map(|_| guard.pop_front()).collect();
        drop(guard);
        let offset = self.next_offset.fetch_add(batch.len() as u64, std::sync::atomic::Ordering::SeqCst) + batch.len() as u64;
        Ok(Some(PolledBatch { envelopes: batch, offset }))
    }

    fn commit(&self, offset: u64) -> Result<(), SourceError> {
        std::fs::write(&self.offset_path, offset.to_string()).map_err(|err| SourceError::Unavailable(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(claim_id: &str) -> RawEnvelope {
        RawEnvelope {
            envelope_version: "1.0.0".to_string(),
            timestamp: "2026-07-28T00:00:00Z".to_string(),
            signature: "deadbeef".to_string(),
            payload: serde_json::json!({ "claim_id": claim_id }),
        }
    }

    #[test]
    fn in_memory_source_delivers_in_order_and_tracks_commits() {
        let source = InMemorySource::new(vec![envelope("CLM-1"), envelope("CLM-2")]);
        let batch = source.poll_batch(10).expect("polls").expect("non-empty");
        assert_eq!(batch.envelopes.len(), 2);
        source.commit(batch.offset).expect("commits");
        assert_eq!(source.committed_offset(), 2);
        assert!(source.poll_batch(10).expect("polls").is_none());
    }

    #[test]
    fn file_source_resumes_after_the_committed_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("claims.ndjson");
        let lines: Vec<String> =
            (0 .. 3).map(|i| serde_json::to_string(&envelope(&format!("CLM-{i}"))).expect("serializes")).collect();
        std::fs::write(&path, lines.join("\n")).expect("writes");
        let uri = format!("file://{}", path.display());

        let source = FileSource::open(&uri).expect("opens");
        let batch = source.poll_batch(10).expect("polls").expect("non-empty");
        assert_eq!(batch.envelopes.len(), 3);
        source.commit(2).expect("commits");

        let resumed = FileSource::open(&uri).expect("reopens");
        let batch = resumed.poll_batch(10).expect("polls").expect("non-empty");
        assert_eq!(batch.envelopes.len(), 1);
    }

    #[test]
    fn file_source_rejects_a_non_file_scheme() {
        let err = FileSource::open("https://example.com/claims.ndjson").expect_err("should fail");
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
