pub mod config;
pub mod inference;
pub mod normalizer;
pub mod presenter;
pub mod session;

pub use config::{AppConfig, ConfigError, ConfigOverrides, SessionSettings};
pub use inference::{GeminiClient, InferenceClient, InferenceRequest};
pub use normalizer::{CanonicalImage, DecodeError, UploadedImage};
pub use presenter::{ResultPresenter, SlotState};
pub use session::{ActionRejected, Session, UploadSummary};
