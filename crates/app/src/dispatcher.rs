use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use jobboard_core::types::FanoutTask;

/// Producer side of the in-process fan-out queue.
///
/// Request handlers enqueue tasks here after their own transaction succeeded;
/// the [`crate::fanout::FanoutWorker`] drains the other end. Delivery is
/// at-least-once from the worker's perspective, but a task is lost if the
/// process dies before the worker picks it up. That trade matches the source
/// operations, which must never fail because a notification could not be
/// written.
#[derive(Clone)]
pub struct TaskDispatcher {
    sender: UnboundedSender<FanoutTask>,
}

impl TaskDispatcher {
    /// Creates the queue and returns the dispatcher plus the worker's end.
    pub fn channel() -> (Self, UnboundedReceiver<FanoutTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Hands a task to the fan-out worker. A closed channel is logged and
    /// swallowed so a dead worker never fails the originating request.
    pub fn enqueue(&self, task: FanoutTask) {
        let kind = task.kind();
        if self.sender.send(task).is_err() {
            warn!(stage = "fanout", %kind, "fan-out worker is gone, dropping task");
        }
    }
}
