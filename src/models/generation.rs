use crate::{
    config::{ServiceConfig, WireFormat},
    error::{PipelineError, Result},
    models::CanonicalImage,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    Fast,
    Standard,
    Pro,
}

impl QualityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityMode::Fast => "fast",
            QualityMode::Standard => "standard",
            QualityMode::Pro => "pro",
        }
    }
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "draft" => Ok(QualityMode::Fast),
            "standard" => Ok(QualityMode::Standard),
            "pro" => Ok(QualityMode::Pro),
            other => Err(PipelineError::InvalidParameter(format!(
                "unknown quality mode '{}'",
                other
            ))),
        }
    }
}

/// Image-to-video request. The credential travels separately so this struct
/// can be logged and stored in history without leaking it.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: CanonicalImage,
    pub prompt: String,
    pub negative_prompt: String,
    pub cfg_scale: f64,
    pub mode: QualityMode,
    pub duration: u32,
    pub fps: Option<u32>,
    pub version: Option<String>,
}

impl GenerationRequest {
    pub fn new(image: CanonicalImage, prompt: impl Into<String>) -> Self {
        Self {
            image,
            prompt: prompt.into(),
            negative_prompt: String::new(),
            cfg_scale: 0.5,
            mode: QualityMode::Pro,
            duration: 5,
            fps: None,
            version: None,
        }
    }

    /// Starts from the service's default prompts and version.
    pub fn for_service(image: CanonicalImage, service: &ServiceConfig) -> Self {
        Self {
            negative_prompt: service.default_negative_prompt.clone(),
            version: service.version.clone(),
            ..Self::new(image, service.default_prompt.clone())
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    pub fn with_cfg_scale(mut self, cfg_scale: f64) -> Self {
        self.cfg_scale = cfg_scale;
        self
    }

    pub fn with_mode(mut self, mode: QualityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = seconds;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn validate(&self, service: &ServiceConfig) -> Result<()> {
        if service.wire != WireFormat::SegmindImageToVideo {
            return Err(PipelineError::InvalidParameter(format!(
                "{} does not accept image-to-video requests",
                service.name
            )));
        }
        if !self.cfg_scale.is_finite() || !(0.0..=1.0).contains(&self.cfg_scale) {
            return Err(PipelineError::InvalidParameter(format!(
                "cfg_scale must be within 0.0..=1.0, got {}",
                self.cfg_scale
            )));
        }
        if !service.allowed_modes.contains(&self.mode) {
            return Err(PipelineError::InvalidParameter(format!(
                "mode '{}' is not supported by {}",
                self.mode, service.name
            )));
        }
        if !service.allowed_durations.contains(&self.duration) {
            return Err(PipelineError::InvalidParameter(format!(
                "duration {}s is not one of {:?}",
                self.duration, service.allowed_durations
            )));
        }
        if let Some(fps) = self.fps {
            if !service.allowed_fps.contains(&fps) {
                return Err(PipelineError::InvalidParameter(format!(
                    "fps {} is not one of {:?}",
                    fps, service.allowed_fps
                )));
            }
        }
        Ok(())
    }

    pub fn payload(&self) -> ImageToVideoPayload<'_> {
        ImageToVideoPayload {
            image: self.image.base64(),
            prompt: &self.prompt,
            negative_prompt: &self.negative_prompt,
            cfg_scale: self.cfg_scale,
            mode: self.mode,
            duration: self.duration,
            fps: self.fps,
            version: self.version.as_deref(),
        }
    }

    pub fn summary(&self) -> String {
        format!("{} {}s cfg={:.2}", self.mode, self.duration, self.cfg_scale)
    }
}

#[derive(Debug, Serialize)]
pub struct ImageToVideoPayload<'a> {
    pub image: &'a str,
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub cfg_scale: f64,
    pub mode: QualityMode,
    pub duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1792x1024")]
    Landscape,
    #[serde(rename = "1024x1792")]
    Portrait,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Landscape => "1792x1024",
            ImageSize::Portrait => "1024x1792",
        }
    }
}

impl FromStr for ImageSize {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1024x1024" => Ok(ImageSize::Square),
            "1792x1024" => Ok(ImageSize::Landscape),
            "1024x1792" => Ok(ImageSize::Portrait),
            other => Err(PipelineError::InvalidParameter(format!(
                "unsupported image size '{}'",
                other
            ))),
        }
    }
}

/// DALL-E style text-to-image request.
#[derive(Debug, Clone, Serialize)]
pub struct TextToImageRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: ImageSize,
}

impl TextToImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: "dall-e-3".to_string(),
            prompt: prompt.into(),
            n: 1,
            size: ImageSize::Square,
        }
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn validate(&self, service: &ServiceConfig) -> Result<()> {
        if service.wire != WireFormat::OpenAiImages {
            return Err(PipelineError::InvalidParameter(format!(
                "{} does not accept text-to-image requests",
                service.name
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(PipelineError::InvalidParameter("prompt is empty".into()));
        }
        let max_n = if self.model == "dall-e-3" { 1 } else { 10 };
        if self.n == 0 || self.n > max_n {
            return Err(PipelineError::InvalidParameter(format!(
                "n must be within 1..={} for {}",
                max_n, self.model
            )));
        }
        Ok(())
    }
}
