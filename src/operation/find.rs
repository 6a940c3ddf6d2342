//! `find` command construction

use mongodb::bson::{Document, doc};

use crate::error::{CursorError, Result};
use crate::options::{CursorOptions, Hint, Namespace, ReadPreference};

use super::Operation;

/// Query-shaping options of a find cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,

    /// Negative values request a single batch of `|limit|` documents
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub hint: Option<Hint>,
    pub collation: Option<Document>,
    pub min: Option<Document>,
    pub max: Option<Document>,
    pub return_key: Option<bool>,
    pub show_record_id: Option<bool>,
    pub allow_disk_use: Option<bool>,
    pub let_vars: Option<Document>,
}

/// A `find` command bound to the cursor's current configuration.
#[derive(Debug)]
pub struct FindOperation<'a> {
    namespace: &'a Namespace,
    filter: &'a Document,
    options: &'a FindOptions,
    cursor_options: &'a CursorOptions,
}

impl<'a> FindOperation<'a> {
    pub fn new(
        namespace: &'a Namespace,
        filter: &'a Document,
        options: &'a FindOptions,
        cursor_options: &'a CursorOptions,
    ) -> Self {
        Self {
            namespace,
            filter,
            options,
            cursor_options,
        }
    }
}

impl Operation for FindOperation<'_> {
    fn name(&self) -> &'static str {
        "find"
    }

    fn namespace(&self) -> &Namespace {
        self.namespace
    }

    fn read_preference(&self) -> ReadPreference {
        self.cursor_options.read_preference
    }

    fn build_command(&self) -> Result<Document> {
        let options = self.options;
        let cursor_options = self.cursor_options;

        let mut command = doc! {
            "find": self.namespace.coll.as_str(),
            "filter": self.filter.clone(),
        };

        if let Some(sort) = &options.sort {
            command.insert("sort", sort.clone());
        }
        if let Some(projection) = &options.projection {
            command.insert("projection", projection.clone());
        }
        if let Some(hint) = &options.hint {
            command.insert("hint", hint.clone());
        }
        if let Some(skip) = options.skip {
            let skip = i64::try_from(skip).map_err(|_| {
                CursorError::InvalidArgument(format!(
                    "skip value {skip} is too large (max: {})",
                    i64::MAX
                ))
            })?;
            command.insert("skip", skip);
        }
        match options.limit {
            Some(limit) if limit < 0 => {
                command.insert("limit", limit.checked_neg().unwrap_or(i64::MAX));
                command.insert("singleBatch", true);
            }
            Some(limit) if limit > 0 => {
                command.insert("limit", limit);
            }
            _ => {}
        }
        if let Some(batch_size) = cursor_options.batch_size {
            let batch_size = i32::try_from(batch_size).map_err(|_| {
                CursorError::InvalidArgument(format!(
                    "batchSize value {batch_size} is too large (max: {})",
                    i32::MAX
                ))
            })?;
            command.insert("batchSize", batch_size);
        }
        if let Some(comment) = &cursor_options.comment {
            command.insert("comment", comment.clone());
        }
        if let Some(max_time_ms) = cursor_options.max_time_ms {
            let max_time_ms = i64::try_from(max_time_ms).map_err(|_| {
                CursorError::InvalidArgument(format!(
                    "maxTimeMS value {max_time_ms} is too large (max: {})",
                    i64::MAX
                ))
            })?;
            command.insert("maxTimeMS", max_time_ms);
        }
        if let Some(read_concern) = &cursor_options.read_concern {
            command.insert("readConcern", read_concern.clone());
        }
        if let Some(max) = &options.max {
            command.insert("max", max.clone());
        }
        if let Some(min) = &options.min {
            command.insert("min", min.clone());
        }
        if let Some(return_key) = options.return_key {
            command.insert("returnKey", return_key);
        }
        if let Some(show_record_id) = options.show_record_id {
            command.insert("showRecordId", show_record_id);
        }

        let flags = cursor_options.flags;
        if flags.tailable {
            command.insert("tailable", true);
        }
        if flags.oplog_replay {
            command.insert("oplogReplay", true);
        }
        if flags.no_cursor_timeout {
            command.insert("noCursorTimeout", true);
        }
        if flags.await_data {
            command.insert("awaitData", true);
        }
        if flags.partial {
            command.insert("allowPartialResults", true);
        }

        if let Some(allow_disk_use) = options.allow_disk_use {
            command.insert("allowDiskUse", allow_disk_use);
        }
        if let Some(collation) = &options.collation {
            command.insert("collation", collation.clone());
        }
        if let Some(let_vars) = &options.let_vars {
            command.insert("let", let_vars.clone());
        }

        Ok(command)
    }
}
