//! `aggregate` command construction

use mongodb::bson::{Document, doc};

use crate::error::{CursorError, Result};
use crate::options::{CursorOptions, Hint, Namespace, ReadPreference};

use super::Operation;

/// Options of an aggregation cursor that are not pipeline stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    pub allow_disk_use: Option<bool>,
    pub hint: Option<Hint>,
    pub collation: Option<Document>,
    pub let_vars: Option<Document>,
    pub bypass_document_validation: Option<bool>,
}

/// An `aggregate` command bound to the cursor's current configuration.
#[derive(Debug)]
pub struct AggregateOperation<'a> {
    namespace: &'a Namespace,
    pipeline: &'a [Document],
    options: &'a AggregateOptions,
    cursor_options: &'a CursorOptions,
}

impl<'a> AggregateOperation<'a> {
    pub fn new(
        namespace: &'a Namespace,
        pipeline: &'a [Document],
        options: &'a AggregateOptions,
        cursor_options: &'a CursorOptions,
    ) -> Self {
        Self {
            namespace,
            pipeline,
            options,
            cursor_options,
        }
    }

    /// Whether the pipeline ends in `$out` or `$merge`.
    pub fn has_write_stage(&self) -> bool {
        has_write_stage(self.pipeline)
    }
}

pub(crate) fn has_write_stage(pipeline: &[Document]) -> bool {
    pipeline
        .last()
        .is_some_and(|stage| stage.contains_key("$out") || stage.contains_key("$merge"))
}

impl Operation for AggregateOperation<'_> {
    fn name(&self) -> &'static str {
        "aggregate"
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

        // Write stages return nothing to iterate, so the batch size is dropped.
        let mut cursor = Document::new();
        if let Some(batch_size) = cursor_options.batch_size.filter(|_| !self.has_write_stage()) {
            let batch_size = i32::try_from(batch_size).map_err(|_| {
                CursorError::InvalidArgument(format!(
                    "batchSize value {batch_size} is too large (max: {})",
                    i32::MAX
                ))
            })?;
            cursor.insert("batchSize", batch_size);
        }

        let mut command = doc! {
            "aggregate": self.namespace.coll.as_str(),
            "pipeline": self.pipeline.to_vec(),
            "cursor": cursor,
        };

        if let Some(allow_disk_use) = options.allow_disk_use {
            command.insert("allowDiskUse", allow_disk_use);
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
        if let Some(comment) = &cursor_options.comment {
            command.insert("comment", comment.clone());
        }
        if let Some(hint) = &options.hint {
            command.insert("hint", hint.clone());
        }
        if let Some(collation) = &options.collation {
            command.insert("collation", collation.clone());
        }
        if let Some(read_concern) = &cursor_options.read_concern {
            command.insert("readConcern", read_concern.clone());
        }
        if let Some(let_vars) = &options.let_vars {
            command.insert("let", let_vars.clone());
        }
        if let Some(bypass) = options.bypass_document_validation {
            command.insert("bypassDocumentValidation", bypass);
        }

        Ok(command)
    }
}
