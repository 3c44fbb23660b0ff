pub mod correct;
pub mod lookup;
pub mod pinyin;
pub mod stream;

use crate::streaming::{PipelineError, StreamSummary};
use anyhow::Result;
use log::{debug, info, warn};
use std::process::ExitCode;
use tokio::sync::oneshot;

/// A receiver that fires on Ctrl-C.
fn cancel_on_ctrl_c() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, cancelling stream");
                let _ = tx.send(());
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    rx
}

/// Maps a pipeline result to an exit code. A closed stdout is the
/// downstream disconnecting, which ends the stream normally.
fn finish_stream(result: Result<StreamSummary, PipelineError>) -> Result<ExitCode> {
    match result {
        Ok(summary) => {
            debug!("Stream summary: {:?}", summary);
            if summary.cancelled {
                Ok(ExitCode::from(130))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(PipelineError::Downstream(e)) => {
            info!("Output closed ({}), upstream released", e);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Err(e.into()),
    }
}
