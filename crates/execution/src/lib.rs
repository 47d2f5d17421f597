//! Execution layer - task lifecycle, memoized lookup, scoped imports and
//! batch scheduling over parameter spaces.

#![warn(missing_docs)]

pub mod error;
pub mod task;
pub mod report;
pub mod context;
pub mod lookup;
pub mod resolver;
pub mod policy;
pub mod lifecycle;
pub mod engine;
pub mod batch;
pub mod lab;

pub use error::ExecError;
pub use task::{Task, TaskBase, TaskKind};
pub use report::Report;
pub use context::{ImportScope, LifecycleState, TaskContext};
pub use lookup::latest_execution;
pub use resolver::{resolve_import, ImportRef, CONTEXT_ID_SCHEME, LATEST_CONTEXT_SCHEME};
pub use policy::{Arbiter, ConsolePrompt, Decision, ExecutionPolicy, ReusePrompt};
pub use lifecycle::{DefaultLifeCycleManager, LifeCycleManager};
pub use engine::{DefaultExecutionEngine, ExecutionService, TaskExecutionEngine};
pub use batch::{subtasks_of, BatchTask, SUBTASKS_KEY};
pub use lab::Lab;
