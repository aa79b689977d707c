use std::fmt::{Debug, Formatter};
use tokio::sync::{mpsc, oneshot};

/// One-shot reply channel handed to the receiving side of an rpc queue.
#[must_use = "response token should be used to respond to a request"]
pub struct ResponseToken<T> {
    sender: oneshot::Sender<T>,
}

impl<T> Debug for ResponseToken<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResponseToken")
    }
}

impl<T> ResponseToken<T> {
    pub fn new() -> (ResponseToken<T>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (ResponseToken { sender: tx }, rx)
    }

    pub fn respond(self, response: T) {
        if self.sender.send(response).is_err() {
            log::warn!("Could not respond to an rpc request, the caller hung up");
        }
    }
}

pub type RpcSender<T> = mpsc::UnboundedSender<T>;
pub type RpcReceiver<T> = mpsc::UnboundedReceiver<T>;

pub fn make_rpc_queue<T>() -> (RpcSender<T>, RpcReceiver<T>) {
    mpsc::unbounded_channel()
}
