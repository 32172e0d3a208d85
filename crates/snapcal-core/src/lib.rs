pub mod calendar;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod history;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod prompt;

pub use calendar::*;
pub use config::*;
pub use context::*;
pub use engine::*;
pub use error::*;
pub use history::*;
pub use normalize::*;
pub use parse::*;
pub use pipeline::*;
pub use prompt::*;

pub use tokio_util::sync::CancellationToken;
