use super::{cancel_on_ctrl_c, finish_stream};
use crate::streaming::{reader_chunks, Framing};
use crate::AppState;
use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use std::process::ExitCode;
use tokio::io::AsyncRead;

/// Corrects a captured upstream stream, writing the result to stdout as it
/// is produced.
pub async fn correct(
    state: &AppState,
    sentence: &str,
    input: Option<&Path>,
    framing: Option<Framing>,
    chunk_size: usize,
) -> Result<ExitCode> {
    let framing = framing.unwrap_or(state.settings.framing);
    let reader: Box<dyn AsyncRead + Unpin + Send> = match input {
        Some(path) => {
            info!("Correcting captured stream {}", path.display());
            Box::new(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?,
            )
        }
        None => Box::new(tokio::io::stdin()),
    };

    let pipeline = state.pipeline(framing);
    let mut stdout = tokio::io::stdout();
    let result = pipeline
        .run(
            sentence,
            reader_chunks(reader, chunk_size),
            &mut stdout,
            cancel_on_ctrl_c(),
        )
        .await;
    finish_stream(result)
}
