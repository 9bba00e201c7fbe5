pub mod agents;
pub mod classify;
pub mod deception;
pub mod evidence;
pub mod prefetch;
pub mod quiz;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use agents::ClaudeAgents;
pub use classify::classify;
pub use deception::DeceptionController;
pub use prefetch::Prefetch;
pub use quiz::QuizController;
pub use settings::RoundSettings;
pub use traits::{Backend, DeceptionAgents, QuizAgents, ValidationRequest};
