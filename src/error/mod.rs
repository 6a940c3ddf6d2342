//! Error handling for cursor operations.
//!
//! This module provides:
//! - The crate-wide [`CursorError`] type and [`Result`] alias
//! - Classification helpers used by the stream adapter (benign shutdown, interrupts)
//! - Structured information extracted from MongoDB driver errors
//!
//! # Example
//!
//! ```rust,no_run
//! use mongocursor::error::{CursorError, Result};
//!
//! fn check_batch_size(value: i32) -> Result<u32> {
//!     u32::try_from(value)
//!         .map_err(|_| CursorError::InvalidArgument(format!("invalid batchSize: {value}")))
//! }
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{ConfigError, CursorError, Result};
pub use mongo::{ErrorInfo, extract_error_info};
