//! Download delivery
//!
//! Export hands a [`DownloadRequest`] to a sink and moves on; nothing waits for
//! the file to land.

use crate::{Error, Result};
use base64::Engine as Base64Engine;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One file to save: name plus a data URL carrying the bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub file_name: String,
    pub href: String,
}

/// Destination for download requests
pub trait DownloadSink {
    fn deliver(&mut self, request: DownloadRequest) -> Result<()>;
}

/// Decode the payload of a base64 data URL
pub fn decode_data_url(href: &str) -> Result<Vec<u8>> {
    let rest = href
        .strip_prefix("data:")
        .ok_or_else(|| Error::InvalidDataUrl("missing data: scheme".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::InvalidDataUrl("missing payload separator".into()))?;
    if !header.ends_with(";base64") {
        return Err(Error::InvalidDataUrl(format!("payload is not base64 ({})", header)));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::InvalidDataUrl(format!("bad base64 payload: {}", e)))
}

/// Writes each download into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Create the sink, creating the directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the request will be written to. Path separators in the name are
    /// replaced so a volume title cannot escape the directory.
    pub fn target_path(&self, file_name: &str) -> PathBuf {
        let safe: String = file_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.dir.join(safe)
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&mut self, request: DownloadRequest) -> Result<()> {
        let bytes = decode_data_url(&request.href)?;
        let path = self.target_path(&request.file_name);
        fs::write(&path, &bytes)?;
        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// Keeps requests in memory; clones share the same list
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    requests: Arc<Mutex<Vec<DownloadRequest>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far
    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.file_name).collect()
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&mut self, request: DownloadRequest) -> Result<()> {
        self.requests
            .lock()
            .map_err(|_| Error::Other("memory sink poisoned".into()))?
            .push(request);
        Ok(())
    }
}
