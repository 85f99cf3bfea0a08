//! OCR post-processing.
//! Runs `ocrmypdf` on an exported PDF in place so the document gets a text
//! layer. It is an external process: its outcome is reported but never touches
//! session state or undoes the export.

use std::path::Path;
use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

pub const OCR_PROGRAM: &str = "ocrmypdf";

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to start {program}: {source}. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Adds a text layer to `pdf` with `ocrmypdf <pdf> <pdf>`.
pub async fn run_ocrmypdf(pdf: &Path) -> Result<(), OcrError> {
    run_post_processor(OCR_PROGRAM, pdf).await
}

/// Runs `program <file> <file>` and waits for it.
pub async fn run_post_processor(program: &str, file: &Path) -> Result<(), OcrError> {
    info!(program, file = %file.display(), "post-processing export");
    let status = Command::new(program)
        .arg(file)
        .arg(file)
        .status()
        .await
        .map_err(|source| OcrError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !status.success() {
        error!(program, %status, "post-processing failed");
        return Err(OcrError::Failed {
            program: program.to_string(),
            status,
        });
    }
    Ok(())
}
