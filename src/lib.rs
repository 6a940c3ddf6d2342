//! MongoDB cursor engine
//!
//! This library implements the cursor layer of a MongoDB client: the lazy,
//! batched iteration of `find` and `aggregate` results, with exactly-once
//! release of the server cursor and of any implicit session.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing for the `mongocursor` binary
//! - `config`: Configuration management
//! - `connection`: Binding of the collaborator traits to the MongoDB driver
//! - `cursor`: Cursor state machine, buffer, variants and stream adapter
//! - `error`: Error types and handling
//! - `operation`: Command construction and execution
//! - `options`: Cursor option types
//! - `topology`: Server, session and topology traits the cursor consumes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::TryStreamExt;
//! use mongodb::bson::doc;
//! use mongocursor::{Config, CursorOptions, FindCursor, MongoTopology, Namespace};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let topology = Arc::new(MongoTopology::connect(&config.connection).await?);
//!
//!     let mut cursor = FindCursor::create(
//!         topology.clone(),
//!         Namespace::new("app", "users"),
//!         doc! { "age": { "$gt": 21 } },
//!         CursorOptions::from(&config.cursor),
//!     );
//!     cursor.sort(doc! { "age": -1 })?.limit(10)?;
//!
//!     let mut stream = cursor.stream();
//!     while let Some(user) = stream.try_next().await? {
//!         println!("{}", user);
//!     }
//!
//!     topology.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod operation;
pub mod options;
pub mod topology;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use connection::MongoTopology;
pub use cursor::{AggregateCursor, CursorState, CursorStream, FindCursor};
pub use error::{CursorError, Result};
pub use options::{CursorOptions, Namespace, ReadPreference};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
