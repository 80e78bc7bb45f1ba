pub mod clock;
pub mod commit;
pub mod config;
pub mod error;
pub mod io;
pub mod metric;
pub mod paths;
pub mod queue;
pub mod score;
pub mod trial;
pub mod types;

pub use error::{CanaryError, Result};
