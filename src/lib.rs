pub mod config;
pub mod encoder;
pub mod error;
pub mod handlers;
pub mod state;
pub mod supervisor;

pub use config::RelayConfig;
pub use state::AppState;
pub use supervisor::{JobHandle, JobSnapshot, JobStatus, Supervisor};
