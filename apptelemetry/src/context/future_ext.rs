use super::OperationContext;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

pin_project! {
    /// A future that carries its own current operation.
    ///
    /// While the inner future is polled its operation is current. Changes
    /// made during a poll (for example by
    /// [`TelemetryTracker::track_operation_begin`]) are captured when the poll
    /// returns, so they survive suspension and are visible after resumption,
    /// even on another thread.
    ///
    /// [`TelemetryTracker::track_operation_begin`]: crate::TelemetryTracker::track_operation_begin
    #[derive(Clone, Debug)]
    pub struct WithOperation<T> {
        #[pin]
        inner: T,
        operation: Option<OperationContext>,
    }
}

impl<T: std::future::Future> std::future::Future for WithOperation<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = super::attach_slot(this.operation.take());

        let poll = this.inner.poll(task_cx);
        *this.operation = OperationContext::current();
        poll
    }
}

impl<F: std::future::Future> OperationFutureExt for F {}

/// Extension trait binding an operation to a future.
pub trait OperationFutureExt: Sized {
    /// Binds `operation` to this future. It is current whenever the future is
    /// polled.
    fn with_operation(self, operation: OperationContext) -> WithOperation<Self> {
        WithOperation {
            inner: self,
            operation: Some(operation),
        }
    }

    /// Binds a snapshot of the current operation to this future.
    ///
    /// Use this when spawning a child task so it inherits the operation of
    /// its parent chain. Later changes on either side are not shared.
    fn with_current_operation(self) -> WithOperation<Self> {
        WithOperation {
            inner: self,
            operation: OperationContext::current(),
        }
    }
}
