//! Upstream byte stream → transducer → downstream sink.
//!
//! One [`StreamCorrector`] per request. Each upstream chunk is processed to
//! completion before the next one is requested; the only suspension points
//! are the upstream read and the downstream write.

use super::sse::EventStreamCorrector;
use super::transducer::{StreamTransducer, TransducerConfig, TransducerStats};
use super::utf8::Utf8Decoder;
use crate::pronunciation::PronunciationOracle;
use futures_util::stream::{self, Stream, StreamExt};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream stream failed: {0}")]
    Upstream(#[source] BoxError),
    #[error("downstream write failed: {0}")]
    Downstream(#[source] std::io::Error),
}

/// How the upstream wraps the segmentation JSON.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// The bytes are the JSON text itself.
    Raw,
    /// The JSON text is carried in server-sent event `data:` lines.
    #[default]
    EventStream,
}

enum Framer {
    Raw(StreamTransducer),
    EventStream(EventStreamCorrector),
}

/// Byte-level front end: UTF-8 reassembly plus framing.
pub struct StreamCorrector {
    decoder: Utf8Decoder,
    framer: Framer,
}

impl StreamCorrector {
    pub fn new(transducer: StreamTransducer, framing: Framing) -> Self {
        let framer = match framing {
            Framing::Raw => Framer::Raw(transducer),
            Framing::EventStream => Framer::EventStream(EventStreamCorrector::new(transducer)),
        };
        Self {
            decoder: Utf8Decoder::new(),
            framer,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> String {
        let text = self.decoder.decode(bytes);
        if text.is_empty() {
            return text;
        }
        self.push_text(&text)
    }

    pub fn finish(&mut self) -> String {
        let rest = self.decoder.finish();
        let mut out = self.push_text(&rest);
        match &mut self.framer {
            Framer::Raw(transducer) => out.push_str(&transducer.finish()),
            Framer::EventStream(corrector) => out.push_str(&corrector.finish()),
        }
        out
    }

    pub fn stats(&self) -> TransducerStats {
        match &self.framer {
            Framer::Raw(transducer) => transducer.stats(),
            Framer::EventStream(corrector) => corrector.transducer().stats(),
        }
    }

    fn push_text(&mut self, text: &str) -> String {
        match &mut self.framer {
            Framer::Raw(transducer) => transducer.push(text),
            Framer::EventStream(corrector) => corrector.push(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub chunks_in: usize,
    pub chunks_out: usize,
    pub bytes_out: usize,
    pub segments_corrected: usize,
    pub segments_kept: usize,
    pub cancelled: bool,
}

impl StreamSummary {
    fn record_stats(&mut self, stats: TransducerStats) {
        self.segments_corrected = stats.corrected;
        self.segments_kept = stats.kept;
    }
}

enum StreamState<S> {
    Active {
        corrector: StreamCorrector,
        upstream: Pin<Box<S>>,
    },
    Done,
}

pub struct Pipeline {
    oracle: Arc<PronunciationOracle>,
    config: TransducerConfig,
    framing: Framing,
}

impl Pipeline {
    pub fn new(oracle: Arc<PronunciationOracle>, config: TransducerConfig, framing: Framing) -> Self {
        Self {
            oracle,
            config,
            framing,
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// A fresh corrector for one request on `sentence`.
    pub fn corrector(&self, sentence: &str) -> StreamCorrector {
        let transducer = StreamTransducer::new(self.oracle.clone(), self.config.clone(), sentence);
        StreamCorrector::new(transducer, self.framing)
    }

    /// Pull-based corrected stream. Nothing is read from `upstream` until the
    /// returned stream is polled; dropping it drops `upstream`.
    pub fn corrected_stream<S, B, E>(
        &self,
        sentence: &str,
        upstream: S,
    ) -> impl Stream<Item = Result<String, PipelineError>>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<BoxError>,
    {
        let initial = StreamState::Active {
            corrector: self.corrector(sentence),
            upstream: Box::pin(upstream),
        };

        stream::unfold(initial, |state| async move {
            let StreamState::Active {
                mut corrector,
                mut upstream,
            } = state
            else {
                return None;
            };

            loop {
                match upstream.next().await {
                    Some(Ok(bytes)) => {
                        let out = corrector.push(bytes.as_ref());
                        if !out.is_empty() {
                            return Some((Ok(out), StreamState::Active { corrector, upstream }));
                        }
                    }
                    Some(Err(e)) => {
                        return Some((Err(PipelineError::Upstream(e.into())), StreamState::Done));
                    }
                    None => {
                        let tail = corrector.finish();
                        if tail.is_empty() {
                            return None;
                        }
                        return Some((Ok(tail), StreamState::Done));
                    }
                }
            }
        })
    }

    /// Drives `upstream` into `sink`, flushing after every chunk.
    ///
    /// Returns early, dropping `upstream` unread, when `cancel` fires or the
    /// sink fails. A dropped `cancel` sender just disarms cancellation.
    pub async fn run<S, B, E, W>(
        &self,
        sentence: &str,
        upstream: S,
        sink: &mut W,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<StreamSummary, PipelineError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<BoxError>,
        W: AsyncWrite + Unpin,
    {
        let mut corrector = self.corrector(sentence);
        let mut upstream = Box::pin(upstream);
        let mut summary = StreamSummary::default();
        let mut cancel_armed = true;

        info!(
            "Starting corrected stream ({} chars, {:?} framing)",
            sentence.chars().count(),
            self.framing
        );

        loop {
            let next = tokio::select! {
                biased;
                signal = &mut cancel, if cancel_armed => {
                    if signal.is_ok() {
                        summary.cancelled = true;
                        summary.record_stats(corrector.stats());
                        info!("Stream cancelled after {} upstream chunks", summary.chunks_in);
                        return Ok(summary);
                    }
                    cancel_armed = false;
                    continue;
                }
                item = upstream.next() => item,
            };

            match next {
                Some(Ok(bytes)) => {
                    summary.chunks_in += 1;
                    let out = corrector.push(bytes.as_ref());
                    write_chunk(sink, &out, &mut summary).await?;
                }
                Some(Err(e)) => {
                    let e = e.into();
                    error!("Upstream stream failed: {}", e);
                    return Err(PipelineError::Upstream(e));
                }
                None => {
                    let tail = corrector.finish();
                    write_chunk(sink, &tail, &mut summary).await?;
                    break;
                }
            }
        }

        summary.record_stats(corrector.stats());
        info!(
            "Stream complete: {} chunks in, {} out, {} corrected, {} kept",
            summary.chunks_in, summary.chunks_out, summary.segments_corrected, summary.segments_kept
        );
        Ok(summary)
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(
    sink: &mut W,
    text: &str,
    summary: &mut StreamSummary,
) -> Result<(), PipelineError> {
    if text.is_empty() {
        return Ok(());
    }
    sink.write_all(text.as_bytes())
        .await
        .map_err(PipelineError::Downstream)?;
    sink.flush().await.map_err(PipelineError::Downstream)?;
    summary.chunks_out += 1;
    summary.bytes_out += text.len();
    debug!("Forwarded {} bytes", text.len());
    Ok(())
}

/// Reads `reader` as a stream of chunks of at most `chunk_size` bytes.
pub fn reader_chunks<R>(reader: R, chunk_size: usize) -> impl Stream<Item = std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let chunk_size = chunk_size.max(1);
    stream::unfold(Some(reader), move |reader| async move {
        let mut reader = reader?;
        let mut buf = vec![0u8; chunk_size];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pronunciation::PinyinAnalyzer;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    const SEGMENTS: &str = r#"{"segments":[{"token":"你好","pronunciation":"ni3 hao3"},{"token":"吗","pronunciation":"ma1"}]}"#;

    fn pipeline(framing: Framing) -> Pipeline {
        let oracle = Arc::new(PronunciationOracle::new(Arc::new(PinyinAnalyzer::new())));
        Pipeline::new(oracle, TransducerConfig::default(), framing)
    }

    fn chunks(bytes: &[u8], size: usize) -> Vec<Result<Vec<u8>, io::Error>> {
        bytes.chunks(size).map(|c| Ok(c.to_vec())).collect()
    }

    #[tokio::test]
    async fn test_corrected_stream_raw() {
        let pipeline = pipeline(Framing::Raw);
        let upstream = stream::iter(chunks(SEGMENTS.as_bytes(), 5));
        let out: Vec<String> = pipeline
            .corrected_stream("你好吗？", upstream)
            .map(|r| r.unwrap())
            .collect()
            .await;
        let joined = out.concat();
        assert!(joined.contains(r#""pronunciation":"ma5""#));
        assert!(joined.contains(r#""token":"吗""#));
    }

    #[tokio::test]
    async fn test_corrected_stream_upstream_error() {
        let pipeline = pipeline(Framing::Raw);
        let upstream = stream::iter(vec![
            Ok(b"{\"segments\":[".to_vec()),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(b"]}".to_vec()),
        ]);
        let items: Vec<_> = pipeline.corrected_stream("你", upstream).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(PipelineError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_run_writes_everything() {
        let pipeline = pipeline(Framing::Raw);
        let upstream = stream::iter(chunks(SEGMENTS.as_bytes(), 7));
        let (_tx, rx) = oneshot::channel();
        let mut sink = Vec::new();
        let summary = pipeline
            .run("你好吗？", upstream, &mut sink, rx)
            .await
            .unwrap();
        let out = String::from_utf8(sink).unwrap();
        assert!(out.contains(r#""pronunciation":"ma5""#));
        assert_eq!(summary.segments_corrected, 2);
        assert_eq!(summary.bytes_out, out.len());
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_does_not_cancel() {
        let pipeline = pipeline(Framing::Raw);
        let upstream = stream::iter(chunks(SEGMENTS.as_bytes(), 3));
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        let mut sink = Vec::new();
        let summary = pipeline.run("你好吗", upstream, &mut sink, rx).await.unwrap();
        assert!(!summary.cancelled);
        assert_eq!(summary.chunks_in, SEGMENTS.len().div_ceil(3));
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_upstream() {
        let pipeline = pipeline(Framing::Raw);
        // First chunk arrives, then the upstream never yields again.
        let upstream = stream::iter(vec![Ok::<_, io::Error>(b"{\"segments\":[".to_vec())])
            .chain(stream::pending());
        let (tx, rx) = oneshot::channel();
        let mut sink = Vec::new();

        let run = pipeline.run("你", upstream, &mut sink, rx);
        let cancel = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.send(()).unwrap();
        };
        let (summary, _) = tokio::join!(run, cancel);
        let summary = summary.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.chunks_in, 1);
        assert_eq!(sink, b"{\"segments\":[");
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_downstream_failure_stops_stream() {
        let pipeline = pipeline(Framing::Raw);
        let upstream = stream::iter(chunks(SEGMENTS.as_bytes(), 4));
        let (_tx, rx) = oneshot::channel();
        let result = pipeline.run("你好吗", upstream, &mut BrokenPipe, rx).await;
        assert!(matches!(result, Err(PipelineError::Downstream(_))));
    }

    #[tokio::test]
    async fn test_reader_chunks() {
        let data = "你好吗".as_bytes();
        let collected: Vec<Vec<u8>> = reader_chunks(data, 2)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(collected.len(), 5);
        assert_eq!(collected.concat(), data);
    }

    #[test]
    fn test_stream_corrector_event_stream_byte_split() {
        let pipeline = pipeline(Framing::EventStream);
        let input = format!("data: {}\n\ndata: [DONE]\n\n", SEGMENTS);
        let bytes = input.as_bytes();
        let mut corrector = pipeline.corrector("你好吗？");
        let mut out = String::new();
        for byte in bytes {
            out.push_str(&corrector.push(std::slice::from_ref(byte)));
        }
        out.push_str(&corrector.finish());
        assert!(out.contains(r#""pronunciation":"ma5""#));
        assert!(out.ends_with("data: [DONE]\n\n"));
    }
}
