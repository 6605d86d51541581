//! Session controller for keyword-to-image-prompt generation over an
//! external inference engine.

pub mod controller;
pub mod error;
pub mod filter;
pub mod profile;
pub mod prompt;

pub use controller::{GenerationOutcome, SessionController};
pub use error::SessionError;
pub use filter::strip_think_tags;
pub use profile::{PromptProfile, RetryPolicy, SessionMessages, DEFAULT_MODEL_ID};
pub use prompt::PromptTemplate;
