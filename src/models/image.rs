use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// Cloud-storage providers whose "view" links need rewriting before download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareProvider {
    Dropbox,
    GoogleDrive,
}

/// Where an input image comes from. Built per request and consumed by
/// `ImageNormalizer::normalize`.
#[derive(Debug, Clone)]
pub enum ImageSource {
    RawBytes {
        bytes: Vec<u8>,
        mime: Option<String>,
    },
    RemoteUrl(String),
    ShareLink {
        url: String,
        provider: Option<ShareProvider>,
    },
}

impl ImageSource {
    pub fn bytes(bytes: impl Into<Vec<u8>>, mime: Option<&str>) -> Self {
        ImageSource::RawBytes {
            bytes: bytes.into(),
            mime: mime.map(String::from),
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ImageSource::RemoteUrl(url.into())
    }

    pub fn share_link(url: impl Into<String>, provider: Option<ShareProvider>) -> Self {
        ImageSource::ShareLink {
            url: url.into(),
            provider,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::RawBytes { .. } => "upload",
            ImageSource::RemoteUrl(_) => "url",
            ImageSource::ShareLink { .. } => "share_link",
        }
    }
}

/// JPEG, 8-bit RGB, no alpha. Only built by the normalizer.
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    bytes: Vec<u8>,
    base64: String,
    width: u32,
    height: u32,
}

impl CanonicalImage {
    pub const MIME: &'static str = "image/jpeg";

    pub(crate) fn from_jpeg(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        let base64 = BASE64.encode(&bytes);
        Self {
            bytes,
            base64,
            width,
            height,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Standard-alphabet, padded radix-64 text for JSON bodies.
    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn mime(&self) -> &'static str {
        Self::MIME
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for CanonicalImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalImage")
            .field("len", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
