//! Cursor configuration types
//!
//! This module defines the option values a cursor carries before and after
//! initialization:
//! - `Namespace`: database plus collection a cursor iterates
//! - `CursorOptions`: batch size, time limits, comment, read preference, session, flags
//! - `CursorFlag` / `CursorFlags`: the named wire flags
//! - `Hint`, `SortDirection`, `ExplainVerbosity`

mod read_preference;
mod sort;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mongodb::bson::{Bson, Document};

use crate::error::{CursorError, Result};
use crate::topology::Session;

pub use read_preference::ReadPreference;
pub use sort::{SortDirection, normalize_sort};

/// Database and collection targeted by a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = CursorError;

    /// Parse `db.collection`. Collection names may themselves contain dots.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Self::new(db, coll)),
            _ => Err(CursorError::InvalidArgument(format!(
                "invalid namespace '{s}', expected '<db>.<collection>'"
            ))),
        }
    }
}

/// Named cursor flags accepted by `add_cursor_flag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorFlag {
    Tailable,
    OplogReplay,
    NoCursorTimeout,
    AwaitData,
    Partial,
}

impl CursorFlag {
    pub const ALL: [CursorFlag; 5] = [
        CursorFlag::Tailable,
        CursorFlag::OplogReplay,
        CursorFlag::NoCursorTimeout,
        CursorFlag::AwaitData,
        CursorFlag::Partial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CursorFlag::Tailable => "tailable",
            CursorFlag::OplogReplay => "oplogReplay",
            CursorFlag::NoCursorTimeout => "noCursorTimeout",
            CursorFlag::AwaitData => "awaitData",
            CursorFlag::Partial => "partial",
        }
    }
}

impl FromStr for CursorFlag {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "exhaust" {
            return Err(CursorError::InvalidArgument(
                "exhaust cursors are not supported".to_string(),
            ));
        }
        CursorFlag::ALL
            .into_iter()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = CursorFlag::ALL.iter().map(CursorFlag::as_str).collect();
                CursorError::InvalidArgument(format!(
                    "flag '{s}' is not one of {}",
                    known.join(", ")
                ))
            })
    }
}

/// Boolean state of every [`CursorFlag`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorFlags {
    pub tailable: bool,
    pub oplog_replay: bool,
    pub no_cursor_timeout: bool,
    pub await_data: bool,
    pub partial: bool,
}

impl CursorFlags {
    pub fn set(&mut self, flag: CursorFlag, value: bool) {
        *self.slot(flag) = value;
    }

    pub fn get(&self, flag: CursorFlag) -> bool {
        match flag {
            CursorFlag::Tailable => self.tailable,
            CursorFlag::OplogReplay => self.oplog_replay,
            CursorFlag::NoCursorTimeout => self.no_cursor_timeout,
            CursorFlag::AwaitData => self.await_data,
            CursorFlag::Partial => self.partial,
        }
    }

    fn slot(&mut self, flag: CursorFlag) -> &mut bool {
        match flag {
            CursorFlag::Tailable => &mut self.tailable,
            CursorFlag::OplogReplay => &mut self.oplog_replay,
            CursorFlag::NoCursorTimeout => &mut self.no_cursor_timeout,
            CursorFlag::AwaitData => &mut self.await_data,
            CursorFlag::Partial => &mut self.partial,
        }
    }
}

/// Options shared by every cursor variant.
#[derive(Debug, Clone, Default)]
pub struct CursorOptions {
    /// Documents per batch, for the first batch and every getMore
    pub batch_size: Option<u32>,

    /// Server-side time limit for the initial command
    pub max_time_ms: Option<u64>,

    /// Time limit a tailable awaitData cursor waits on getMore
    pub max_await_time_ms: Option<u64>,

    /// Comment attached to the command and to getMore
    pub comment: Option<Bson>,

    /// Read preference used to select the server
    pub read_preference: ReadPreference,

    /// Read concern document
    pub read_concern: Option<Document>,

    /// Caller-supplied session. The cursor borrows it and never ends it.
    pub session: Option<Arc<dyn Session>>,

    /// Wire flags
    pub flags: CursorFlags,
}

impl CursorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a caller-owned session.
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }
}

/// Index hint.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    Keys(Document),
    Name(String),
}

impl From<Hint> for Bson {
    fn from(hint: Hint) -> Self {
        match hint {
            Hint::Keys(keys) => Bson::Document(keys),
            Hint::Name(name) => Bson::String(name),
        }
    }
}

/// Explain verbosity level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExplainVerbosity {
    #[default]
    QueryPlanner,
    ExecutionStats,
    AllPlansExecution,
}

impl ExplainVerbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplainVerbosity::QueryPlanner => "queryPlanner",
            ExplainVerbosity::ExecutionStats => "executionStats",
            ExplainVerbosity::AllPlansExecution => "allPlansExecution",
        }
    }
}

impl FromStr for ExplainVerbosity {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queryPlanner" => Ok(ExplainVerbosity::QueryPlanner),
            "executionStats" => Ok(ExplainVerbosity::ExecutionStats),
            "allPlansExecution" => Ok(ExplainVerbosity::AllPlansExecution),
            other => Err(CursorError::InvalidArgument(format!(
                "unknown explain verbosity '{other}'"
            ))),
        }
    }
}

/// A collation document must name its locale.
pub(crate) fn validate_collation(collation: &Document) -> Result<()> {
    match collation.get("locale") {
        Some(Bson::String(locale)) if !locale.is_empty() => Ok(()),
        _ => Err(CursorError::InvalidArgument(
            "collation requires a non-empty 'locale' string".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_namespace_round_trip() {
        let ns: Namespace = "app.users.archive".parse().unwrap();
        assert_eq!(ns.db, "app");
        assert_eq!(ns.coll, "users.archive");
        assert_eq!(ns.to_string(), "app.users.archive");
    }

    #[test]
    fn test_namespace_rejects_missing_collection() {
        assert!("app".parse::<Namespace>().is_err());
        assert!("app.".parse::<Namespace>().is_err());
        assert!(".users".parse::<Namespace>().is_err());
    }

    #[test]
    fn test_cursor_flag_names() {
        assert_eq!("awaitData".parse::<CursorFlag>().unwrap(), CursorFlag::AwaitData);
        let err = "awaitdata".parse::<CursorFlag>().unwrap_err();
        assert!(matches!(err, CursorError::InvalidArgument(_)));
    }

    #[test]
    fn test_exhaust_flag_rejected() {
        let err = "exhaust".parse::<CursorFlag>().unwrap_err();
        assert!(err.to_string().contains("not supported"));
        assert!(!CursorFlag::ALL.iter().any(|flag| flag.as_str() == "exhaust"));
    }

    #[test]
    fn test_cursor_flags_set_and_get() {
        let mut flags = CursorFlags::default();
        flags.set(CursorFlag::Tailable, true);
        assert!(flags.get(CursorFlag::Tailable));
        assert!(flags.tailable);
        flags.set(CursorFlag::Tailable, false);
        assert!(!flags.tailable);
    }

    #[test]
    fn test_hint_into_bson() {
        assert_eq!(Bson::from(Hint::Name("a_1".into())), Bson::String("a_1".into()));
        assert_eq!(
            Bson::from(Hint::Keys(doc! { "a": 1 })),
            Bson::Document(doc! { "a": 1 })
        );
    }

    #[test]
    fn test_collation_requires_locale() {
        assert!(validate_collation(&doc! { "locale": "en" }).is_ok());
        assert!(validate_collation(&doc! { "strength": 2 }).is_err());
        assert!(validate_collation(&doc! { "locale": 1 }).is_err());
    }

    #[test]
    fn test_explain_verbosity() {
        assert_eq!(
            "executionStats".parse::<ExplainVerbosity>().unwrap(),
            ExplainVerbosity::ExecutionStats
        );
        assert_eq!(ExplainVerbosity::default().as_str(), "queryPlanner");
        assert!("verbose".parse::<ExplainVerbosity>().is_err());
    }
}
