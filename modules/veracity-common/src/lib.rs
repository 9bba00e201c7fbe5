pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{FailureClass, GenerationError, RoundError, Stage, VeracityError};
pub use types::*;
