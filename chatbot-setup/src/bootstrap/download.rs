//! HTTP download with progress reporting, retry logic and SHA-256 checks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Download-related errors.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error: {status} for {url}")]
    HttpError { status: u16, url: String },

    #[error("Refusing non-HTTPS installer URL: {0}")]
    InsecureUrl(String),
}

/// Checksum verification errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("No checksum configured for installer (observed sha256 {actual})")]
    Missing { actual: String },

    #[error("Invalid sha256 value: {0}")]
    Malformed(String),
}

/// Configuration for retry behavior.
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// Something that can place the contents of a URL at a local path.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// [`Fetcher`] backed by reqwest.
pub struct HttpFetcher {
    retry: RetryConfig,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        if !url.starts_with("https://") {
            return Err(DownloadError::InsecureUrl(url.to_string()).into());
        }
        download_file_with_retry(url, destination, "Downloading Ollama installer...", &self.retry)
            .await
    }
}

/// Download a file with progress bar and retry logic.
pub async fn download_file_with_retry(
    url: &str,
    destination: &Path,
    description: &str,
    config: &RetryConfig,
) -> Result<()> {
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match download_file_once(url, destination, description).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if attempt >= config.max_attempts {
                    return Err(e).context(format!(
                        "Download failed after {} attempts",
                        config.max_attempts
                    ));
                }

                log::warn!(
                    "Download failed (attempt {}/{}): {:#}",
                    attempt,
                    config.max_attempts,
                    e
                );
                log::info!("Retrying in {:?}...", delay);

                tokio::time::sleep(delay).await;
                delay = next_delay(delay, config);
            }
        }
    }
}

fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::from_secs_f32(
        (delay.as_secs_f32() * config.backoff_factor).min(config.max_delay.as_secs_f32()),
    )
}

/// Perform a single download attempt.
async fn download_file_once(url: &str, destination: &Path, description: &str) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(120))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to connect")?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
        }
        .into());
    }

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {msg}\n  {bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec})")?
                    .progress_chars("=>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("  {msg} {bytes}")?);
            pb
        }
    };
    pb.set_message(description.to_string());

    let mut file =
        std::fs::File::create(destination).context("Failed to create destination file")?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading response")?;
        file.write_all(&chunk).context("Failed to write to file")?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    pb.finish_and_clear();
    log::debug!("Downloaded {} to {}", format_bytes(downloaded), destination.display());

    Ok(())
}

/// Compute the lower-case hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Normalize a user-supplied sha256 value (trim, lower-case, 64 hex chars).
pub fn normalize_sha256(value: &str) -> Result<String, ChecksumError> {
    let value = value.trim().to_lowercase();
    if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ChecksumError::Malformed(value));
    }
    Ok(value)
}

/// Compare an observed digest against the expected one.
///
/// With no expected digest the check passes unless `require` is set.
pub fn verify_checksum(
    actual: &str,
    expected: Option<&str>,
    require: bool,
) -> Result<(), ChecksumError> {
    match expected {
        Some(expected) => {
            let expected = normalize_sha256(expected)?;
            if expected != actual {
                return Err(ChecksumError::Mismatch {
                    expected,
                    actual: actual.to_string(),
                });
            }
            Ok(())
        }
        None if require => Err(ChecksumError::Missing {
            actual: actual.to_string(),
        }),
        None => Ok(()),
    }
}

/// Format bytes for human-readable display.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Fetcher that writes fixed content and counts calls.
#[cfg(test)]
pub struct StaticFetcher {
    content: Vec<u8>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl StaticFetcher {
    pub fn new(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _url: &str, destination: &Path) -> Result<()> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        std::fs::write(destination, &self.content)?;
        Ok(())
    }
}
