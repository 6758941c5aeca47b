//! Input resolution: turn a user-supplied path or URL into document bytes.
//!
//! The orchestrator works on bytes (the HTTP endpoint never sees a file), so
//! both local paths and URLs are read fully into memory here. The PDF magic
//! (`%PDF`) is checked before returning so callers get a meaningful error
//! rather than a pdfium failure deep inside the extract phase.

use crate::error::BlueprintError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A document read into memory, with a name suitable for storage keys.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download an HTTP(S) URL.
pub async fn read_document(input: &str, timeout_secs: u64) -> Result<DocumentInput, BlueprintError> {
    let doc = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else if input.contains("://") || input.trim().is_empty() {
        return Err(BlueprintError::InvalidInput {
            input: input.to_string(),
        });
    } else {
        read_local(input).await?
    };
    ensure_pdf_magic(&doc.bytes)?;
    Ok(doc)
}

/// Reject payloads that do not start with `%PDF`.
pub fn ensure_pdf_magic(bytes: &[u8]) -> Result<(), BlueprintError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(BlueprintError::NotAPdf { magic })
}

async fn read_local(path_str: &str) -> Result<DocumentInput, BlueprintError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => BlueprintError::PermissionDenied { path: path.clone() },
        _ => BlueprintError::FileNotFound { path: path.clone() },
    })?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    Ok(DocumentInput { bytes, file_name })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<DocumentInput, BlueprintError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BlueprintError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            BlueprintError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BlueprintError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(BlueprintError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| BlueprintError::DownloadFailed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(DocumentInput {
        bytes: bytes.to_vec(),
        file_name: file_name_from_url(url),
    })
}

/// Last path segment of the URL when it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}
