pub mod audit;
pub mod classifier;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod gate;
pub mod generator;
pub mod sessions;
pub mod stats;

pub use audit::*;
pub use classifier::*;
pub use config::*;
pub use context::*;
pub use engine::*;
pub use error::*;
pub use gate::*;
pub use generator::*;
pub use sessions::*;
pub use stats::*;
