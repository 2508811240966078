use serde::{Deserialize, Serialize};

use crate::message::RpcMessage;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Observer of the message exchange of a client.
/// Called on the thread which reads or writes the message, while the session lock is held.
/// The monitor may query the client from the same call, e.g. [crate::RpcClient::state]
pub trait Monitor: Send + Sync {
    fn message(&self, message: &RpcMessage, direction: Direction);
}
