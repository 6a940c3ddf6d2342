//! Cursor execution engine
//!
//! This module contains:
//! - `AbstractCursor`, the state machine shared by every cursor variant, and the
//!   `CursorCommand` trait each variant implements to open its cursor
//! - `BatchBuffer`, the client-side document buffer with transform composition
//! - `SessionOwnership`, recording whether the cursor must end its session
//! - `FindCursor` and `AggregateCursor`, the concrete variants
//! - `CursorStream`, the `futures::Stream` adapter
//!
//! A cursor moves through `Uninitialized -> Active -> Exhausted -> Closed`;
//! `Closed` is reachable from every state.

mod abstract_cursor;
mod aggregate;
mod buffer;
mod find;
mod session;
mod stream;


pub use abstract_cursor::{AbstractCursor, CursorCommand, DEFAULT_BATCH_SIZE};
pub use aggregate::{AggregateCommand, AggregateCursor};
pub use buffer::{BatchBuffer, Transform};
pub use find::{FindCommand, FindCursor};
pub use session::SessionOwnership;
pub use stream::CursorStream;

/// Observable lifecycle state of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No command has been sent yet
    Uninitialized,
    /// The server holds a live cursor
    Active,
    /// The server cursor is gone; buffered documents may remain
    Exhausted,
    /// Closed by exhaustion, by the caller or by a failure
    Closed,
}
