//! Metric emission for snowdrift runs.
//!
//! Events are recorded through the `metrics` facade. No exporter is installed
//! here; whoever embeds the loader decides where the numbers go.

pub mod events;

/// Record an event through its [`events::InternalEvent`] impl.
///
/// ```ignore
/// use snowdrift_core::metrics::events::{StatementExecuted, ExecutionMode};
///
/// emit!(StatementExecuted { mode: ExecutionMode::Sync });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;

pub use events::InternalEvent;
