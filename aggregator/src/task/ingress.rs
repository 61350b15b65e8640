use crate::types::{ResponseWithSignature, ValidatedResponse};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};

/// Messages that can be sent to a task [super::Actor].
pub enum Message {
    /// Record a response and answer `responder` once the task is finalized.
    Collect {
        response: ResponseWithSignature,
        responder: oneshot::Sender<ValidatedResponse>,
    },
    /// Finalize the task before its deadline.
    Finalize,
}

/// A mailbox that can be used to send [Message]s to a task.
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    /// Creates a new [Mailbox] with the given [mpsc::Sender].
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Hands `response` to the task, returning a receiver for the task's outcome.
    ///
    /// Returns `None` if the task is no longer accepting messages.
    pub async fn collect(
        &mut self,
        response: ResponseWithSignature,
    ) -> Option<oneshot::Receiver<ValidatedResponse>> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Message::Collect {
                response,
                responder,
            })
            .await
            .ok()?;
        Some(receiver)
    }

    /// Asks the task to finalize now.
    pub async fn finalize(&mut self) -> bool {
        self.sender.send(Message::Finalize).await.is_ok()
    }
}
