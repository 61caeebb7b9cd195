//! Recognition of many files through one service without overrunning it.
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use scribe_ocr::OcrOutput;

use crate::service::{OcrService, SubmitOptions};

pub type FileOutcome = anyhow::Result<Arc<OcrOutput>>;

/// Recognizes every file in `paths`, returning outcomes in input order.
///
/// At most `max_in_flight + max_queued` files are read and submitted at a
/// time, so the batch is never rejected by the service queue and a file's
/// deadline only starts once there is room for it.
pub async fn recognize_files(
    service: &OcrService,
    paths: Vec<PathBuf>,
    options: SubmitOptions,
) -> Vec<(PathBuf, FileOutcome)> {
    let window = service.config().max_in_flight + service.config().max_queued;
    let mut outcomes: Vec<(usize, PathBuf, FileOutcome)> = stream::iter(paths.into_iter().enumerate())
        .map(|(index, path)| {
            let service = service.clone();
            let options = options.clone();
            async move {
                let outcome = match tokio::fs::read(&path).await {
                    Ok(bytes) => service.recognize(bytes, options).await.map_err(anyhow::Error::from),
                    Err(e) => Err(anyhow::Error::new(e).context("reading file")),
                };
                (index, path, outcome)
            }
        })
        .buffer_unordered(window.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(index, _, _)| *index);
    outcomes
        .into_iter()
        .map(|(_, path, outcome)| (path, outcome))
        .collect()
}
