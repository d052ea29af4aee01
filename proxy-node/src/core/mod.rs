pub mod conversation;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod processor;
pub mod reasoning;
pub mod router;
pub mod sensitive;
pub mod state;

pub use error::NodeError;
pub use state::{AppState, SharedState};
