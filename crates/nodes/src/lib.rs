//! `nodes` crate — the `BlockHandler` trait, the built-in block handlers,
//! and the registry that maps `blockType` strings to them.
//!
//! Every block type — built-in and future plugin alike — implements
//! [`BlockHandler`]. The engine crate dispatches execution through
//! [`wrap_execution`], which also fulfils the per-handler persistence
//! contract: open a `NodeExecution` row, log on entry/exit/failure, close
//! the row with the handler's output or error.

pub mod diff;
pub mod error;
pub mod exec;
pub mod handlers;
pub mod mock;
pub mod registry;
pub mod replay;
pub mod services;
pub mod traits;

pub use error::HandlerError;
pub use exec::wrap_execution;
pub use registry::{default_registry, BlockRegistry};
pub use traits::{BlockHandler, ExecutionContext, NodeSpec};
