//! Command-line interface for mongocursor
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Applying argument overrides to the loaded configuration
//! - Turning JSON arguments into filter, sort and pipeline documents

use clap::{Parser, Subcommand};
use mongodb::bson::{Bson, Document};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::error::{CursorError, Result};
use crate::options::{CursorOptions, ExplainVerbosity, Namespace, ReadPreference};

/// Run a cursor against MongoDB and stream its documents as JSON
#[derive(Parser, Debug)]
#[command(
    name = "mongocursor",
    version,
    about = "Stream MongoDB find and aggregate results through a batched cursor"
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(long, value_name = "URI", global = true)]
    pub uri: Option<String>,

    /// Path to configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Documents per batch
    #[arg(long, value_name = "N", global = true)]
    pub batch_size: Option<u32>,

    /// Server-side time limit for the initial command
    #[arg(long, value_name = "MS", global = true)]
    pub max_time_ms: Option<u64>,

    /// Read preference mode (primary, secondaryPreferred, ...)
    #[arg(long, value_name = "MODE", global = true)]
    pub read_preference: Option<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Enable very verbose logging
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for mongocursor
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a find query
    Find {
        /// Namespace as <db>.<collection>
        #[arg(value_name = "NAMESPACE")]
        namespace: String,

        /// Query filter as (extended) JSON
        #[arg(short, long, default_value = "{}")]
        filter: String,

        /// Sort specification as JSON
        #[arg(long)]
        sort: Option<String>,

        /// Projection as JSON
        #[arg(long)]
        projection: Option<String>,

        /// Maximum number of documents; negative for a single batch
        #[arg(long, allow_hyphen_values = true)]
        limit: Option<i64>,

        /// Number of documents to skip
        #[arg(long)]
        skip: Option<i64>,

        /// Keep the cursor open on a capped collection
        #[arg(long)]
        tailable: bool,

        /// Block on getMore for new data (with --tailable)
        #[arg(long, requires = "tailable")]
        await_data: bool,

        /// Print the query plan instead of results
        #[arg(long, value_name = "VERBOSITY")]
        explain: Option<String>,
    },

    /// Run an aggregation pipeline
    Aggregate {
        /// Namespace as <db>.<collection>
        #[arg(value_name = "NAMESPACE")]
        namespace: String,

        /// Pipeline as a JSON array of stages
        #[arg(short, long)]
        pipeline: String,

        /// Allow stages to spill to disk
        #[arg(long)]
        allow_disk_use: bool,

        /// Print the query plan instead of results
        #[arg(long, value_name = "VERBOSITY")]
        explain: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

impl CliArgs {
    /// Apply argument overrides on top of file and environment values
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(uri) = &self.uri {
            config.connection.uri = uri.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.cursor.batch_size = Some(batch_size);
        }
        if let Some(max_time_ms) = self.max_time_ms {
            config.cursor.max_time_ms = Some(max_time_ms);
        }
        if self.very_verbose {
            config.logging.level = LogLevel::Trace;
        } else if self.verbose {
            config.logging.level = LogLevel::Debug;
        }
    }

    /// Cursor options seeded from configuration and the read preference flag
    pub fn cursor_options(&self, config: &Config) -> Result<CursorOptions> {
        let options = CursorOptions::from(&config.cursor);
        match &self.read_preference {
            Some(mode) => Ok(options.with_read_preference(ReadPreference::from_name(mode)?)),
            None => Ok(options),
        }
    }
}

/// Parse a `<db>.<collection>` argument
pub fn parse_namespace(namespace: &str) -> Result<Namespace> {
    namespace.parse()
}

/// Parse an explain verbosity argument
pub fn parse_verbosity(verbosity: &str) -> Result<ExplainVerbosity> {
    verbosity.parse()
}

/// Parse a JSON object argument into a document
///
/// Extended JSON such as `{"$oid": "..."}` is accepted.
///
/// # Arguments
/// * `label` - Argument name used in error messages
/// * `json` - JSON text
pub fn parse_document(label: &str, json: &str) -> Result<Document> {
    match parse_bson(label, json)? {
        Bson::Document(document) => Ok(document),
        other => Err(CursorError::InvalidArgument(format!(
            "{label} must be a JSON object, got {other}"
        ))),
    }
}

/// Parse a JSON array of stage objects
pub fn parse_pipeline(json: &str) -> Result<Vec<Document>> {
    let Bson::Array(stages) = parse_bson("pipeline", json)? else {
        return Err(CursorError::InvalidArgument(
            "pipeline must be a JSON array".to_string(),
        ));
    };

    stages
        .into_iter()
        .enumerate()
        .map(|(i, stage)| match stage {
            Bson::Document(stage) => Ok(stage),
            other => Err(CursorError::InvalidArgument(format!(
                "pipeline stage {i} must be an object, got {other}"
            ))),
        })
        .collect()
}

fn parse_bson(label: &str, json: &str) -> Result<Bson> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CursorError::InvalidArgument(format!("invalid JSON for {label}: {e}")))?;
    Bson::try_from(value)
        .map_err(|e| CursorError::InvalidArgument(format!("invalid extended JSON for {label}: {e}")))
}

/// Hide credentials in a connection URI for display
pub fn sanitize_uri(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(proto_end), Some(host_start)) if host_start > proto_end => {
            format!("{}***{}", &uri[..proto_end + 3], &uri[host_start..])
        }
        _ => uri.to_string(),
    }
}
