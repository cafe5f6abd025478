//! # Bounded Upload Collection
//!
//! Accumulates the chunks of an uploaded file part as they arrive over the
//! network and gives up the moment the running total passes the ceiling.
//!
//! ## Key Features:
//! - **Early abort**: the size check runs after every chunk, so an oversized
//!   upload is rejected without draining the rest of the stream
//! - **Arrival order**: chunks are concatenated exactly in the order received,
//!   which keeps the WAV header and PCM alignment intact
//! - **Zero-copy fast path**: a single-chunk upload is returned without copying

use crate::error::PipelineError;
use actix_web::web::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;

/// Append-only list of received chunks plus a running byte count.
///
/// ## Invariant:
/// `len()` never exceeds `limit`. A push that would break this fails and the
/// buffer should be dropped.
#[derive(Debug)]
pub struct UploadBuffer {
    chunks: Vec<Bytes>,
    total: usize,
    limit: usize,
}

impl UploadBuffer {
    /// Create an empty buffer that accepts at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            chunks: Vec::new(),
            total: 0,
            limit,
        }
    }

    /// Append one chunk, failing with `PayloadTooLarge` once the ceiling is passed.
    pub fn push(&mut self, chunk: Bytes) -> Result<(), PipelineError> {
        let total = self.total.saturating_add(chunk.len());
        if total > self.limit {
            return Err(PipelineError::PayloadTooLarge {
                limit: self.limit,
                received: total,
            });
        }

        self.total = total;
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
        Ok(())
    }

    /// Bytes accepted so far.
    pub fn len(&self) -> usize {
        self.total
    }

    /// Number of non-empty chunks held.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Concatenate all chunks into one contiguous buffer.
    pub fn into_bytes(mut self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.remove(0),
            _ => {
                let mut joined = BytesMut::with_capacity(self.total);
                for chunk in &self.chunks {
                    joined.extend_from_slice(chunk);
                }
                joined.freeze()
            }
        }
    }
}

/// Drain `stream` into one buffer of at most `max_bytes`.
///
/// ## Behavior:
/// - Suspends on each chunk; checks the running total after each one
/// - Returns `PayloadTooLarge` immediately when the total passes `max_bytes`;
///   the remaining chunks are left unread
/// - A stream error becomes `Internal`
/// - Zero chunks is a (degenerate) success: an empty buffer
///
/// ## Rust Concepts:
/// - **Generic stream**: works for an actix multipart field or a test stream
/// - **std::pin::pin!**: pins the stream on the stack so `next()` can poll it
pub async fn collect<S, E>(stream: S, max_bytes: usize) -> Result<Bytes, PipelineError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer = UploadBuffer::new(max_bytes);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| PipelineError::Internal(format!("upload stream failed: {}", e)))?;
        buffer.push(chunk)?;
    }

    tracing::debug!(
        bytes = buffer.len(),
        chunks = buffer.chunk_count(),
        "Upload collected"
    );

    Ok(buffer.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const MIB: usize = 1024 * 1024;

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    #[actix_web::test]
    async fn test_chunks_are_joined_in_arrival_order() {
        let collected = collect(chunks(vec![vec![1, 2], vec![3], vec![4, 5, 6]]), 1024)
            .await
            .unwrap();
        assert_eq!(&collected[..], &[1, 2, 3, 4, 5, 6]);
    }

    #[actix_web::test]
    async fn test_eleven_mib_is_rejected_before_stream_ends() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        // 20 one-MiB chunks offered; the 11th must trip the 10 MiB ceiling.
        let source = stream::iter(0..20).map(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(Bytes::from(vec![0u8; MIB]))
        });

        let err = collect(source, 10 * MIB).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::PayloadTooLarge {
                limit: 10 * MIB,
                received: 11 * MIB
            }
        );
        assert_eq!(pulled.load(Ordering::SeqCst), 11);
    }

    #[actix_web::test]
    async fn test_exactly_at_limit_is_accepted() {
        let collected = collect(chunks(vec![vec![7; 6], vec![7; 4]]), 10).await.unwrap();
        assert_eq!(collected.len(), 10);
    }

    #[actix_web::test]
    async fn test_empty_stream_yields_empty_buffer() {
        let collected = collect(chunks(Vec::new()), 10).await.unwrap();
        assert!(collected.is_empty());
    }

    #[actix_web::test]
    async fn test_stream_error_is_internal() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"RIFF")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer gone")),
        ]);
        let err = collect(source, 1024).await.unwrap_err();
        assert_eq!(err.code(), "internal_error");
        assert!(err.to_string().contains("peer gone"));
    }

    #[test]
    fn test_buffer_rejects_overflowing_push() {
        let mut buffer = UploadBuffer::new(4);
        buffer.push(Bytes::from_static(b"abc")).unwrap();
        assert!(buffer.push(Bytes::from_static(b"de")).is_err());
        // The rejected chunk is not counted.
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.chunk_count(), 1);
    }
}
