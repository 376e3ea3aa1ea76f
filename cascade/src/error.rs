use std::any::Any;
use std::sync::Arc;

/// A centralized error type for everything that can cancel a task.
///
/// Cancellation here means "the task completed with an error": there is no
/// interruption of running code. The error is clonable so that a single
/// failure can propagate to every dependent of the failed task.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TaskError {
    /// The task body panicked. Carries the panic message when the payload was
    /// a string, a placeholder otherwise.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// An [`Event`](crate::Event) was dropped before a value was set.
    #[error("event dropped before a value was set")]
    AbandonedEvent,

    /// A scheduler dropped the run handle without ever executing the task.
    /// Also reported for tasks still queued when a pool shuts down.
    #[error("task was dropped by its scheduler without being executed")]
    NotExecuted,

    /// An application-supplied failure, used with
    /// [`Stage::canceled`](crate::Stage::canceled) and
    /// [`Event::set_error`](crate::Event::set_error).
    #[error("{0}")]
    App(Arc<anyhow::Error>),
}

impl TaskError {
    /// Wraps an application error.
    pub fn app(err: anyhow::Error) -> Self {
        TaskError::App(Arc::new(err))
    }

    /// Builds the error for a captured panic payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_string());
        TaskError::Panicked(msg)
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked(_))
    }

    pub fn is_abandoned_event(&self) -> bool {
        matches!(self, TaskError::AbandonedEvent)
    }

    pub fn is_not_executed(&self) -> bool {
        matches!(self, TaskError::NotExecuted)
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::app(err)
    }
}

impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Panicked(a), Self::Panicked(b)) => a == b,
            (Self::AbandonedEvent, Self::AbandonedEvent) => true,
            (Self::NotExecuted, Self::NotExecuted) => true,
            (Self::App(a), Self::App(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use static_assertions::assert_impl_all;

    assert_impl_all!(TaskError: Send, Sync, Clone);

    #[test]
    fn panic_payload_messages() {
        let from_str = TaskError::from_panic(Box::new("boom"));
        assert_eq!(from_str, TaskError::Panicked("boom".to_string()));

        let from_string = TaskError::from_panic(Box::new("again".to_string()));
        assert_eq!(from_string, TaskError::Panicked("again".to_string()));

        let opaque = TaskError::from_panic(Box::new(17_u32));
        assert!(opaque.is_panic());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            TaskError::AbandonedEvent.to_string(),
            "event dropped before a value was set"
        );
        assert_eq!(
            TaskError::NotExecuted.to_string(),
            "task was dropped by its scheduler without being executed"
        );
        assert_eq!(
            TaskError::app(anyhow!("bad input")).to_string(),
            "bad input"
        );
    }

    #[test]
    fn app_errors_compare_by_identity() {
        let a = TaskError::app(anyhow!("x"));
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(a, TaskError::app(anyhow!("x")));
    }
}
