use std::sync::Arc;

use parking_lot::Mutex;

use caplink_rpc::{
    message::{RpcData, RpcMessage},
    monitor::{Direction, Monitor},
};

#[derive(Clone, Default)]
pub struct AccMonitor {
    messages: Arc<Mutex<Vec<(RpcMessage, Direction)>>>,
}

impl AccMonitor {
    pub fn messages(&self) -> Vec<(RpcMessage, Direction)> {
        self.messages.lock().clone()
    }

    pub fn print(&self) -> String {
        let mut result = String::new();

        for (message, direction) in self.messages.lock().iter() {
            let direction_str = match direction {
                Direction::Incoming => "incoming",
                Direction::Outgoing => "outgoing",
            };

            let kind = match &message.data {
                RpcData::Call { method, .. } => format!("call {method}"),
                RpcData::Response(Ok(_)) => "response".to_owned(),
                RpcData::Response(Err(e)) => format!("error {}", e.code),
            };

            result.push_str(&format!("{direction_str}: {} {kind}\n", message.id));
        }

        result
    }
}

impl Monitor for AccMonitor {
    fn message(&self, message: &RpcMessage, direction: Direction) {
        self.messages.lock().push((message.clone(), direction));
    }
}
