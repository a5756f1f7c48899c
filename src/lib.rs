//! # appdate
//!
//! A library for checking whether a newer version of an application is
//! published on the App Store, using the public lookup API.
//!
//! ## Waiting for the result
//!
//! ```no_run
//! use appdate::{UpdateChecker, UpdateCheckerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UpdateCheckerConfig::new(284882215, env!("CARGO_PKG_VERSION"))
//!         .timeout(std::time::Duration::from_secs(10));
//!     let checker = UpdateChecker::new(config)?;
//!
//!     let result = checker.check().await?;
//!     if result.update_available {
//!         println!("Update available: {}", result.app_info.version);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Notifying an observer
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use appdate::{AppInfo, UpdateCheckError, UpdateChecker, UpdateObserver};
//!
//! struct Prompt;
//!
//! impl UpdateObserver for Prompt {
//!     fn update_check_completed(&self, app_info: &AppInfo, update_available: bool) {
//!         if update_available {
//!             println!("Version {} is available", app_info.version);
//!         }
//!     }
//!
//!     fn update_check_failed(&self, error: &UpdateCheckError) {
//!         eprintln!("Update check failed: {}", error);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let checker = UpdateChecker::with_app_id(284882215, env!("CARGO_PKG_VERSION"))?;
//!
//!     // Only a weak reference is kept, so the observer must outlive the check
//!     let prompt = Arc::new(Prompt);
//!     checker.set_observer(&prompt);
//!     checker.check_now();
//!
//!     // ... the application keeps running; the observer is notified once
//!     # tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     Ok(())
//! }
//! ```
//!
//! [`UpdateChecker::check_now_with_completion`] takes a closure instead of
//! using the observer.

mod checker;
mod error;
mod types;
mod version;

pub use checker::{UpdateChecker, UpdateObserver};
pub use error::{Result, UpdateCheckError};
pub use types::{
    AppInfo, UpdateCheck, UpdateCheckerConfig, VersionProvider, DEFAULT_BASE_URL, LOOKUP_PATH,
};
pub use version::{is_update_available, Version, VersionParseError};
