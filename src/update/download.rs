use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use super::error::DownloadError;
use super::transport::HttpTransport;

const CHUNK_SIZE: usize = 8192;

/// Fetches URLs through an injected [`HttpTransport`].
pub struct Downloader<'a> {
    transport: &'a dyn HttpTransport,
}

impl<'a> Downloader<'a> {
    pub fn new(transport: &'a dyn HttpTransport) -> Self {
        Self { transport }
    }

    /// Read the whole response body into memory.
    ///
    /// An empty body is an error: every caller expects a payload.
    pub fn fetch_to_memory(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let mut body = self.transport.get(url)?;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf)
            .map_err(|source| DownloadError::Body {
                url: url.to_string(),
                source,
            })?;
        if buf.is_empty() {
            return Err(DownloadError::EmptyResponse {
                url: url.to_string(),
            });
        }
        debug!(url, bytes = buf.len(), "fetched into memory");
        Ok(buf)
    }

    /// Stream the response body into a new file at `dest`, returning the
    /// number of bytes written.
    ///
    /// Parent directories are created first. If the transfer breaks off,
    /// the partial file stays on disk.
    pub fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            info!("creating download directory {}", parent.display());
            fs::create_dir_all(parent).map_err(|source| DownloadError::CannotCreateFile {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut body = self.transport.get(url)?;

        let file = File::create(dest).map_err(|source| DownloadError::CannotCreateFile {
            path: dest.to_path_buf(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        let write_err = |source: std::io::Error| DownloadError::Write {
            path: dest.to_path_buf(),
            source,
        };

        let mut buf = [0u8; CHUNK_SIZE];
        let mut total: u64 = 0;
        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    let _ = out.flush();
                    return Err(DownloadError::Body {
                        url: url.to_string(),
                        source,
                    });
                }
            };
            out.write_all(&buf[..n]).map_err(write_err)?;
            total += n as u64;
        }
        out.flush().map_err(write_err)?;

        info!(url, bytes = total, "downloaded {}", dest.display());
        Ok(total)
    }
}
