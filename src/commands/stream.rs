use super::{cancel_on_ctrl_c, finish_stream};
use crate::llm_client::{api_key_from_env, stream_segmentation};
use crate::streaming::Framing;
use crate::AppState;
use anyhow::{Context, Result};
use log::info;
use std::process::ExitCode;

/// Requests a segmentation for `sentence` and prints the corrected JSON as
/// the model generates it.
pub async fn stream(state: &AppState, sentence: &str) -> Result<ExitCode> {
    let provider = &state.settings.provider;
    let api_key = api_key_from_env(provider)?;

    info!(
        "Requesting segmentation from {} ({})",
        provider.label, provider.model
    );
    let upstream = stream_segmentation(provider, &api_key, sentence)
        .await
        .context("Failed to start segmentation request")?;

    // Content fragments are the JSON text itself.
    let pipeline = state.pipeline(Framing::Raw);
    let mut stdout = tokio::io::stdout();
    let result = pipeline
        .run(sentence, upstream, &mut stdout, cancel_on_ctrl_c())
        .await;
    finish_stream(result)
}
