use parking_lot::Mutex;

use crate::stream::{ConnectOptions, DuplexStream};

/// Connector, which opens a stream to the host.
/// Called by the client on every [crate::rpc::RpcClient::connect]
pub trait Connector: Send + Sync {
    fn connect(&self) -> crate::Result<DuplexStream>;
}

/// Connects to a named pipe or a Unix socket path
pub struct EndpointConnector {
    endpoint: String,
    options: ConnectOptions,
}

impl EndpointConnector {
    pub fn new(endpoint: &str, options: ConnectOptions) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            options,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Connector for EndpointConnector {
    fn connect(&self) -> crate::Result<DuplexStream> {
        DuplexStream::open(&self.endpoint, &self.options)
    }
}

/// Connector, which hands out an already connected stream once, but later
/// refuses connection attempts
pub struct OneTimeConnector {
    stream: Mutex<Option<DuplexStream>>,
}

impl OneTimeConnector {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

impl Connector for OneTimeConnector {
    fn connect(&self) -> crate::Result<DuplexStream> {
        self.stream
            .lock()
            .take()
            .ok_or(crate::Error::ConnectionClosed)
    }
}
