use std::os::unix::net::UnixStream;

use serde_json::Value;

use caplink_rpc::{
    message::{RpcData, RpcMessage, WireError, INVOKE_CALLBACK_METHOD, INVOKE_CAPABILITY_METHOD},
    message_stream::{ReadMessage, WriteMessage},
    DuplexStream, OneTimeConnector, RpcClient, RpcClientBuilder,
};

/// Scripted host side of a client connection
pub struct FakeHost {
    stream: UnixStream,
}

/// Client builder connected to a fake host
pub fn client_pair() -> (RpcClientBuilder, FakeHost) {
    let (client_stream, host_stream) = UnixStream::pair().unwrap();

    let connector = OneTimeConnector::new(DuplexStream::from_transport("fake-host", client_stream));

    (RpcClient::builder(connector), FakeHost::new(host_stream))
}

impl FakeHost {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    pub fn read(&mut self) -> RpcMessage {
        self.stream.read_message().unwrap()
    }

    /// Read a call to `method`. Returns the request id and params
    pub fn expect_call(&mut self, method: &str) -> (i64, Vec<Value>) {
        let message = self.read();

        match message.data {
            RpcData::Call {
                method: call_method,
                params,
            } => {
                assert_eq!(call_method, method);
                (message.id, params)
            }
            other => panic!("Expected `{method}` call, got {other:?}"),
        }
    }

    /// Read a capability call. Returns the request id, capability id and args
    pub fn expect_capability(&mut self, capability_id: &str) -> (i64, Value) {
        let (id, mut params) = self.expect_call(INVOKE_CAPABILITY_METHOD);

        assert_eq!(params.len(), 2);
        assert_eq!(params[0], Value::String(capability_id.into()));

        (id, params.remove(1))
    }

    pub fn expect_response(&mut self, id: i64) -> Result<Value, WireError> {
        let message = self.read();
        assert_eq!(message.id, id);

        match message.data {
            RpcData::Response(response) => response,
            other => panic!("Expected response {id}, got {other:?}"),
        }
    }

    pub fn respond(&mut self, id: i64, result: Value) {
        self.stream
            .write_message(&RpcMessage::response(id, Ok(result)))
            .unwrap()
    }

    pub fn respond_error(&mut self, id: i64, error: WireError) {
        self.stream
            .write_message(&RpcMessage::response(id, Err(error)))
            .unwrap()
    }

    pub fn invoke_callback(&mut self, id: i64, callback_id: &str, args: Value) {
        self.call(
            id,
            INVOKE_CALLBACK_METHOD,
            vec![Value::String(callback_id.into()), args],
        )
    }

    pub fn call(&mut self, id: i64, method: &str, params: Vec<Value>) {
        self.stream
            .write_message(&RpcMessage::call(id, method, params))
            .unwrap()
    }
}
