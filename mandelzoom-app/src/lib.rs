//! Session state, preferences, and the batch-job front end behind the
//! `mandelzoom` binary.

pub mod app;
pub mod app_dir;
pub mod cli;
pub mod error;
pub mod job;
pub mod preferences;
pub mod session;

pub use app::App;
pub use error::{AppError, Result};
pub use preferences::AppPreferences;
pub use session::Session;
