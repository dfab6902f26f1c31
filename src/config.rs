use crate::{
    credential::{Credential, CredentialPlacement},
    error::{PipelineError, Result},
    models::QualityMode,
};
use std::env;
use std::time::Duration;

pub const SEGMIND_KLING_ENDPOINTS: [&str; 2] = [
    "https://api.segmind.com/v1/kling-image2video",
    "https://api.segmind.com/v1/kling-1.6-image2video",
];
pub const OPENAI_IMAGES_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";

const WHITE: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub background_fill: [u8; 3],
    pub jpeg_quality: u8,
    pub max_input_bytes: usize,
    pub max_output_bytes: usize,
    pub fetch_timeout: Duration,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            background_fill: WHITE,
            jpeg_quality: 90,
            max_input_bytes: 20 * 1024 * 1024,
            max_output_bytes: 10 * 1024 * 1024,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl NormalizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let background_fill = env::var("GENPIPE_BACKGROUND")
            .ok()
            .and_then(|value| parse_hex_color(&value))
            .unwrap_or(defaults.background_fill);
        let max_input_bytes = env_parse("GENPIPE_MAX_INPUT_BYTES").unwrap_or(defaults.max_input_bytes);
        let fetch_timeout = env_parse("GENPIPE_FETCH_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout);

        NormalizerConfig {
            background_fill,
            max_input_bytes,
            fetch_timeout,
            ..defaults
        }
    }

    pub fn with_background(mut self, fill: [u8; 3]) -> Self {
        self.background_fill = fill;
        self
    }

    pub fn with_limits(mut self, max_input_bytes: usize, max_output_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Timeout and retry budget applied to every endpoint candidate.
///
/// Only timeouts are retried; any other failure moves on to the next
/// endpoint immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::video()
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Video generation routinely takes several minutes.
    pub fn video() -> Self {
        RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(600),
        }
    }

    pub fn image() -> Self {
        RetryPolicy {
            read_timeout: Duration::from_secs(120),
            ..Self::video()
        }
    }

    /// Applies `GENPIPE_*` overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        RetryPolicy {
            max_attempts: env_parse("GENPIPE_MAX_ATTEMPTS").unwrap_or(self.max_attempts),
            retry_delay: env_parse("GENPIPE_RETRY_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(self.retry_delay),
            connect_timeout: env_parse("GENPIPE_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(self.connect_timeout),
            read_timeout: env_parse("GENPIPE_READ_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(self.read_timeout),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }
}

/// Ordered endpoint candidates plus the policy used against each of them.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointPlan {
    pub endpoints: Vec<String>,
    pub policy: RetryPolicy,
}

impl EndpointPlan {
    pub fn new(policy: RetryPolicy) -> Self {
        EndpointPlan {
            endpoints: Vec::new(),
            policy,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints.extend(endpoints.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `{image, prompt, negative_prompt, cfg_scale, mode, duration}`
    SegmindImageToVideo,
    /// `{model, prompt, n, size}`
    OpenAiImages,
}

/// One hosted generation service: where it lives, how it authenticates and
/// which parameter values it accepts.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub wire: WireFormat,
    pub endpoints: Vec<String>,
    pub credential: CredentialPlacement,
    pub credential_env: String,
    pub allowed_modes: Vec<QualityMode>,
    pub allowed_durations: Vec<u32>,
    pub allowed_fps: Vec<u32>,
    pub version: Option<String>,
    pub default_prompt: String,
    pub default_negative_prompt: String,
    pub policy: RetryPolicy,
}

impl ServiceConfig {
    pub fn segmind_kling() -> Self {
        ServiceConfig {
            name: "segmind-kling".to_string(),
            wire: WireFormat::SegmindImageToVideo,
            endpoints: SEGMIND_KLING_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            credential: CredentialPlacement::Header("x-api-key".to_string()),
            credential_env: "SEGMIND_API_KEY".to_string(),
            allowed_modes: vec![QualityMode::Fast, QualityMode::Standard, QualityMode::Pro],
            allowed_durations: vec![5, 10],
            allowed_fps: vec![24, 30, 60],
            version: None,
            default_prompt: "Breathtaking cinematic scene, dramatic lighting, highly detailed"
                .to_string(),
            default_negative_prompt:
                "Blurry, distorted, low quality, glitch, shaking, text, watermark, signature"
                    .to_string(),
            policy: RetryPolicy::video(),
        }
    }

    pub fn openai_dalle() -> Self {
        ServiceConfig {
            name: "openai-dalle".to_string(),
            wire: WireFormat::OpenAiImages,
            endpoints: vec![OPENAI_IMAGES_ENDPOINT.to_string()],
            credential: CredentialPlacement::Bearer,
            credential_env: "OPENAI_API_KEY".to_string(),
            allowed_modes: Vec::new(),
            allowed_durations: Vec::new(),
            allowed_fps: Vec::new(),
            version: None,
            default_prompt: String::new(),
            default_negative_prompt: String::new(),
            policy: RetryPolicy::image(),
        }
    }

    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_allowed_durations(mut self, durations: Vec<u32>) -> Self {
        self.allowed_durations = durations;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn plan(&self) -> EndpointPlan {
        EndpointPlan::new(self.policy.clone()).with_endpoints(self.endpoints.iter().cloned())
    }

    pub fn credential(&self, secret: impl Into<String>) -> Credential {
        Credential::new(secret, self.credential.clone())
    }

    pub fn credential_from_env(&self) -> Result<Credential> {
        match env::var(&self.credential_env) {
            Ok(secret) if !secret.trim().is_empty() => Ok(self.credential(secret.trim())),
            _ => Err(PipelineError::ConfigError(format!(
                "{} is not set",
                self.credential_env
            ))),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

/// Parses `#rrggbb` or `rrggbb`.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
