//! Aggregation cursor
//!
//! `AggregateCursor` iterates the results of an `aggregate` command. Stage
//! appenders add to the pipeline in call order and are only valid before the
//! first pull.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};

use crate::error::{CursorError, Result};
use crate::operation::{
    AggregateOperation, AggregateOptions, ExecutionResult, ExplainOperation, Operation,
    execute_operation,
};
use crate::options::{
    CursorOptions, ExplainVerbosity, Hint, Namespace, normalize_sort, validate_collation,
};
use crate::topology::{Session, Topology};

use super::abstract_cursor::{AbstractCursor, CursorCommand};

/// An `aggregate` command: namespace, pipeline and options.
#[derive(Debug, Clone)]
pub struct AggregateCommand {
    namespace: Namespace,
    pipeline: Vec<Document>,
    options: AggregateOptions,
}

impl AggregateCommand {
    pub fn new(namespace: Namespace, pipeline: Vec<Document>) -> Self {
        Self {
            namespace,
            pipeline,
            options: AggregateOptions::default(),
        }
    }

    pub fn pipeline(&self) -> &[Document] {
        &self.pipeline
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }
}

#[async_trait]
impl CursorCommand for AggregateCommand {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn initialize(
        &self,
        topology: &dyn Topology,
        session: Option<Arc<dyn Session>>,
        options: &CursorOptions,
    ) -> Result<ExecutionResult> {
        let operation =
            AggregateOperation::new(&self.namespace, &self.pipeline, &self.options, options);
        execute_operation(topology, &operation, session).await
    }
}

/// Cursor over the results of an aggregation pipeline.
pub type AggregateCursor = AbstractCursor<AggregateCommand>;

impl AbstractCursor<AggregateCommand> {
    /// Create an uninitialized aggregation cursor.
    pub fn create(
        topology: Arc<dyn Topology>,
        namespace: Namespace,
        pipeline: Vec<Document>,
        options: CursorOptions,
    ) -> Self {
        AbstractCursor::new(topology, AggregateCommand::new(namespace, pipeline), options)
    }

    /// Append a raw pipeline stage.
    pub fn add_stage(&mut self, stage: Document) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        if stage.len() != 1 {
            return Err(CursorError::InvalidArgument(format!(
                "a pipeline stage must have exactly one field, got {}",
                stage.len()
            )));
        }
        self.command_mut().pipeline.push(stage);
        Ok(self)
    }

    fn push_stage(&mut self, name: &str, value: impl Into<Bson>) -> Result<&mut Self> {
        let mut stage = Document::new();
        stage.insert(name, value.into());
        self.add_stage(stage)
    }

    /// Append `$match`.
    pub fn match_filter(&mut self, filter: Document) -> Result<&mut Self> {
        self.push_stage("$match", filter)
    }

    pub fn group(&mut self, group: Document) -> Result<&mut Self> {
        self.push_stage("$group", group)
    }

    pub fn project(&mut self, projection: Document) -> Result<&mut Self> {
        self.push_stage("$project", projection)
    }

    pub fn sort(&mut self, sort: Document) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        let sort = normalize_sort(sort)?;
        self.push_stage("$sort", sort)
    }

    pub fn limit(&mut self, limit: i64) -> Result<&mut Self> {
        if limit <= 0 {
            return Err(CursorError::InvalidArgument(format!(
                "$limit must be a positive integer, got {limit}"
            )));
        }
        self.push_stage("$limit", limit)
    }

    pub fn skip(&mut self, skip: i64) -> Result<&mut Self> {
        if skip < 0 {
            return Err(CursorError::InvalidArgument(format!(
                "$skip must be a non-negative integer, got {skip}"
            )));
        }
        self.push_stage("$skip", skip)
    }

    /// Append `$unwind` for a field path such as `$tags`, or a full
    /// `{ path, ... }` specification.
    pub fn unwind(&mut self, field: impl Into<Bson>) -> Result<&mut Self> {
        self.push_stage("$unwind", field)
    }

    pub fn lookup(
        &mut self,
        from: &str,
        local_field: &str,
        foreign_field: &str,
        as_field: &str,
    ) -> Result<&mut Self> {
        self.push_stage(
            "$lookup",
            doc! {
                "from": from,
                "localField": local_field,
                "foreignField": foreign_field,
                "as": as_field,
            },
        )
    }

    /// Append `$out`. The cursor then returns no documents.
    pub fn out(&mut self, destination: impl Into<Bson>) -> Result<&mut Self> {
        self.push_stage("$out", destination)
    }

    pub fn redact(&mut self, expression: Document) -> Result<&mut Self> {
        self.push_stage("$redact", expression)
    }

    pub fn geo_near(&mut self, options: Document) -> Result<&mut Self> {
        self.push_stage("$geoNear", options)
    }

    fn aggregate_options(&mut self) -> Result<&mut AggregateOptions> {
        self.assert_uninitialized()?;
        Ok(&mut self.command_mut().options)
    }

    pub fn allow_disk_use(&mut self, allow_disk_use: bool) -> Result<&mut Self> {
        self.aggregate_options()?.allow_disk_use = Some(allow_disk_use);
        Ok(self)
    }

    pub fn hint(&mut self, hint: Hint) -> Result<&mut Self> {
        self.aggregate_options()?.hint = Some(hint);
        Ok(self)
    }

    pub fn collation(&mut self, collation: Document) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        validate_collation(&collation)?;
        self.command_mut().options.collation = Some(collation);
        Ok(self)
    }

    pub fn let_vars(&mut self, let_vars: Document) -> Result<&mut Self> {
        self.aggregate_options()?.let_vars = Some(let_vars);
        Ok(self)
    }

    pub fn bypass_document_validation(&mut self, bypass: bool) -> Result<&mut Self> {
        self.aggregate_options()?.bypass_document_validation = Some(bypass);
        Ok(self)
    }

    /// Run `explain` for this pipeline and return the raw plan document.
    pub async fn explain(&self, verbosity: ExplainVerbosity) -> Result<Document> {
        let command = self.command();
        let aggregate = AggregateOperation::new(
            &command.namespace,
            &command.pipeline,
            &command.options,
            self.options(),
        );
        let explain = ExplainOperation::new(
            command.namespace.clone(),
            aggregate.build_command()?,
            verbosity,
            self.options().read_preference,
        );

        let session = self.session().cloned();
        let result = execute_operation(self.topology().as_ref(), &explain, session).await?;
        Ok(result.response)
    }
}
