pub mod canonical;
pub mod share_link;

use crate::{
    config::NormalizerConfig,
    error::{PipelineError, Result},
    models::{CanonicalImage, ImageSource},
};
use reqwest::{header::CONTENT_TYPE, Client};
use url::Url;

pub use canonical::{decode, encode_canonical, flatten_alpha};
pub use share_link::{detect_provider, rewrite_share_link};

/// Turns any `ImageSource` into a `CanonicalImage`.
#[derive(Clone)]
pub struct ImageNormalizer {
    client: Client,
    config: NormalizerConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub async fn normalize(&self, source: ImageSource) -> Result<CanonicalImage> {
        log::debug!("Normalizing {} image source", source.kind());

        match source {
            ImageSource::RawBytes { bytes, mime } => self.normalize_bytes(&bytes, mime.as_deref()),
            ImageSource::RemoteUrl(url) => self.normalize_remote(&url).await,
            ImageSource::ShareLink { url, provider } => {
                let direct = rewrite_share_link(&url, provider);
                if direct != url {
                    log::info!("Rewrote share link to direct download: {}", direct);
                }
                self.normalize_remote(&direct).await
            }
        }
    }

    pub fn normalize_bytes(&self, bytes: &[u8], mime: Option<&str>) -> Result<CanonicalImage> {
        if bytes.len() > self.config.max_input_bytes {
            return Err(PipelineError::PayloadTooLarge(format!(
                "input image is {} bytes, limit is {}",
                bytes.len(),
                self.config.max_input_bytes
            )));
        }

        let image = decode(bytes, mime)?;
        let canonical = encode_canonical(&image, &self.config)?;

        log::debug!(
            "Canonical image {}x{} ({} bytes from {} input bytes)",
            canonical.dimensions().0,
            canonical.dimensions().1,
            canonical.len(),
            bytes.len()
        );
        Ok(canonical)
    }

    async fn normalize_remote(&self, url: &str) -> Result<CanonicalImage> {
        let (bytes, mime) = self.fetch(url).await?;
        self.normalize_bytes(&bytes, mime.as_deref())
    }

    /// GETs an image, returning its body and declared content type.
    pub async fn fetch(&self, raw_url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let url = Url::parse(raw_url.trim())
            .map_err(|e| PipelineError::FetchError(format!("invalid URL '{}': {}", raw_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PipelineError::FetchError(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        log::info!("Fetching image from {}", url);

        let response = self
            .client
            .get(url.clone())
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(|e| PipelineError::FetchError(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::FetchError(format!(
                "{} returned status {}",
                url,
                status.as_u16()
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.config.max_input_bytes as u64 {
                return Err(PipelineError::PayloadTooLarge(format!(
                    "remote image is {} bytes, limit is {}",
                    length, self.config.max_input_bytes
                )));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_ascii_lowercase());

        let bytes = self.read_limited(response, &url).await?;

        let declared = match content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => content_type.clone(),
            // generic binary is accepted only when the bytes are an image
            None | Some("application/octet-stream") | Some("binary/octet-stream") => {
                if image::guess_format(&bytes).is_err() {
                    return Err(PipelineError::FetchError(format!(
                        "{} did not return image content",
                        url
                    )));
                }
                None
            }
            Some(other) => {
                return Err(PipelineError::FetchError(format!(
                    "{} returned content type '{}', expected an image",
                    url, other
                )));
            }
        };

        Ok((bytes, declared))
    }

    /// Reads the body chunk by chunk, giving up once it passes the input
    /// limit. Chunked responses carry no Content-Length to check up front.
    async fn read_limited(&self, mut response: reqwest::Response, url: &Url) -> Result<Vec<u8>> {
        let limit = self.config.max_input_bytes;
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PipelineError::FetchError(format!("reading body from {}: {}", url, e)))?
        {
            if bytes.len() + chunk.len() > limit {
                return Err(PipelineError::PayloadTooLarge(format!(
                    "remote image exceeds the {} byte limit",
                    limit
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}
