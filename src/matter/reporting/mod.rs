//! Server side of read and subscribe interactions.

pub mod dirty;
pub mod engine;
pub mod expand;
pub mod read_handler;
pub mod report_builder;
pub mod scheduler;

pub use dirty::DirtySet;
pub use engine::{Engine, HandlerHandle, TeardownReason};
pub use expand::{AttributePathExpander, expand_all};
pub use read_handler::{HandlerState, InteractionType, ReadHandler};
pub use scheduler::IntervalScheduler;
