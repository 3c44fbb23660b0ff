//! Streaming pronunciation correction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Pipeline                                │
//! │                                                                      │
//! │  upstream ──▶ ┌─────────────┐   ┌──────────────┐   ┌──────────────┐  │
//! │  bytes        │ Utf8Decoder │──▶│ SSE framing  │──▶│  Transducer  │  │
//! │               └─────────────┘   │  (optional)  │   └──────┬───────┘  │
//! │                                 └──────────────┘          │          │
//! │                                                           ▼          │
//! │                                             PronunciationOracle      │
//! │                                                           │          │
//! │  sink ◀──────────────────── corrected fragments ◀─────────┘          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod pipeline;
pub mod scanner;
pub mod sse;
pub mod transducer;
pub mod utf8;

pub use pipeline::{reader_chunks, Framing, Pipeline, PipelineError, StreamCorrector, StreamSummary};
pub use transducer::{StreamTransducer, TransducerConfig, TransducerState, TransducerStats};
