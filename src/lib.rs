pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod models;
pub mod normalizer;
pub mod session;

pub use config::{EndpointPlan, NormalizerConfig, RetryPolicy, ServiceConfig, WireFormat};
pub use credential::{Credential, CredentialPlacement};
pub use dispatch::Dispatcher;
pub use error::{ErrorKind, PipelineError, Result};
pub use models::{
    extension_for_mime, CanonicalImage, GenerationFailure, GenerationRequest, GenerationResult,
    ImageSize, ImageSource, QualityMode, ShareProvider, TextToImageRequest,
};
pub use normalizer::{encode_canonical, rewrite_share_link, ImageNormalizer};
pub use session::{HistoryEntry, RequestHistory, SessionState};
