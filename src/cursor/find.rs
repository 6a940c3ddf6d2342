//! Find cursor
//!
//! `FindCursor` iterates the results of a `find` command. Query-shaping builders
//! are only valid before the first pull; `sort`, `limit` and `skip` are
//! rejected on tailable cursors.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::{CursorError, Result};
use crate::operation::{
    ExecutionResult, ExplainOperation, FindOperation, FindOptions, Operation, execute_operation,
};
use crate::options::{
    CursorOptions, ExplainVerbosity, Hint, Namespace, normalize_sort, validate_collation,
};
use crate::topology::{Session, Topology};

use super::abstract_cursor::{AbstractCursor, CursorCommand};

/// A `find` command: namespace, filter and query options.
#[derive(Debug, Clone)]
pub struct FindCommand {
    namespace: Namespace,
    filter: Document,
    options: FindOptions,
}

impl FindCommand {
    pub fn new(namespace: Namespace, filter: Document) -> Self {
        Self {
            namespace,
            filter,
            options: FindOptions::default(),
        }
    }

    pub fn filter(&self) -> &Document {
        &self.filter
    }

    pub fn options(&self) -> &FindOptions {
        &self.options
    }
}

#[async_trait]
impl CursorCommand for FindCommand {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn initialize(
        &self,
        topology: &dyn Topology,
        session: Option<Arc<dyn Session>>,
        options: &CursorOptions,
    ) -> Result<ExecutionResult> {
        let operation = FindOperation::new(&self.namespace, &self.filter, &self.options, options);
        execute_operation(topology, &operation, session).await
    }

    /// Clamp the getMore batch to what is left of a positive limit.
    fn get_more_batch_size(&self, batch_size: u32, num_returned: u64) -> Option<u32> {
        let limit = match self.options.limit {
            Some(limit) if limit > 0 => limit.unsigned_abs(),
            _ => return Some(batch_size),
        };

        let remaining = limit.saturating_sub(num_returned);
        if remaining == 0 {
            return None;
        }
        let remaining = u32::try_from(remaining).unwrap_or(u32::MAX);
        if batch_size == 0 {
            Some(remaining)
        } else {
            Some(batch_size.min(remaining))
        }
    }
}

/// Cursor over the results of a `find` command.
pub type FindCursor = AbstractCursor<FindCommand>;

impl AbstractCursor<FindCommand> {
    /// Create an uninitialized find cursor.
    ///
    /// # Arguments
    /// * `topology` - Topology the cursor runs against
    /// * `namespace` - Collection to query
    /// * `filter` - Query filter
    /// * `options` - Shared cursor options
    pub fn create(
        topology: Arc<dyn Topology>,
        namespace: Namespace,
        filter: Document,
        options: CursorOptions,
    ) -> Self {
        AbstractCursor::new(topology, FindCommand::new(namespace, filter), options)
    }

    fn find_options(&mut self) -> Result<&mut FindOptions> {
        self.assert_uninitialized()?;
        Ok(&mut self.command_mut().options)
    }

    /// Replace the query filter.
    pub fn filter(&mut self, filter: Document) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        self.command_mut().filter = filter;
        Ok(self)
    }

    /// Set the sort order. Values may be `1`, `-1`, direction names or `$meta`.
    pub fn sort(&mut self, sort: Document) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        if self.is_tailable() {
            return Err(CursorError::InvalidArgument(
                "Tailable cursor doesn't support sorting".to_string(),
            ));
        }
        let sort = normalize_sort(sort)?;
        self.command_mut().options.sort = Some(sort);
        Ok(self)
    }

    /// Limit the number of documents. A negative limit asks for a single batch.
    pub fn limit(&mut self, limit: i64) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        if self.is_tailable() {
            return Err(CursorError::InvalidArgument(
                "Tailable cursor doesn't support limit".to_string(),
            ));
        }
        self.command_mut().options.limit = Some(limit);
        Ok(self)
    }

    pub fn skip(&mut self, skip: i64) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        if self.is_tailable() {
            return Err(CursorError::InvalidArgument(
                "Tailable cursor doesn't support skip".to_string(),
            ));
        }
        let skip = u64::try_from(skip).map_err(|_| {
            CursorError::InvalidArgument(format!("skip must be a non-negative integer, got {skip}"))
        })?;
        self.command_mut().options.skip = Some(skip);
        Ok(self)
    }

    pub fn project(&mut self, projection: Document) -> Result<&mut Self> {
        self.find_options()?.projection = Some(projection);
        Ok(self)
    }

    pub fn hint(&mut self, hint: Hint) -> Result<&mut Self> {
        self.find_options()?.hint = Some(hint);
        Ok(self)
    }

    pub fn collation(&mut self, collation: Document) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        validate_collation(&collation)?;
        self.command_mut().options.collation = Some(collation);
        Ok(self)
    }

    /// Inclusive lower index bound.
    pub fn min(&mut self, min: Document) -> Result<&mut Self> {
        self.find_options()?.min = Some(min);
        Ok(self)
    }

    /// Exclusive upper index bound.
    pub fn max(&mut self, max: Document) -> Result<&mut Self> {
        self.find_options()?.max = Some(max);
        Ok(self)
    }

    pub fn return_key(&mut self, return_key: bool) -> Result<&mut Self> {
        self.find_options()?.return_key = Some(return_key);
        Ok(self)
    }

    pub fn show_record_id(&mut self, show_record_id: bool) -> Result<&mut Self> {
        self.find_options()?.show_record_id = Some(show_record_id);
        Ok(self)
    }

    pub fn allow_disk_use(&mut self, allow_disk_use: bool) -> Result<&mut Self> {
        self.find_options()?.allow_disk_use = Some(allow_disk_use);
        Ok(self)
    }

    /// Variables usable as `$$name` in the filter.
    pub fn let_vars(&mut self, let_vars: Document) -> Result<&mut Self> {
        self.find_options()?.let_vars = Some(let_vars);
        Ok(self)
    }

    /// Run `explain` for this query and return the raw plan document.
    ///
    /// The cursor itself is neither initialized nor advanced.
    pub async fn explain(&self, verbosity: ExplainVerbosity) -> Result<Document> {
        let command = self.command();
        let find = FindOperation::new(&command.namespace, &command.filter, &command.options, self.options());
        let explain = ExplainOperation::new(
            command.namespace.clone(),
            find.build_command()?,
            verbosity,
            self.options().read_preference,
        );

        let session = self.session().cloned();
        let result = execute_operation(self.topology().as_ref(), &explain, session).await?;
        Ok(result.response)
    }
}
