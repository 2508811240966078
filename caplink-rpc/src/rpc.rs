use std::{
    cell::RefCell,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{SystemTime, UNIX_EPOCH},
};

#[cfg(not(feature = "log-to-stdout"))]
use log::{debug, info, trace, warn};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::Value;

#[cfg(feature = "monitor")]
use crate::monitor::{Direction, Monitor};
#[cfg(feature = "log-to-stdout")]
use crate::{debug, info, trace, warn};
use crate::{
    callback_registry::{panic_message, CallbackRegistry},
    cancellation::CancellationToken,
    config::ClientConfig,
    connector::{Connector, EndpointConnector},
    error::CapabilityError,
    handle::{RemoteObject, RemoteValue, WrapperRegistry},
    message::{
        RpcData, RpcMessage, WireError, CANCEL_TOKEN_METHOD, INVOKE_CALLBACK_METHOD,
        INVOKE_CAPABILITY_METHOD,
    },
    message_stream::{ReadMessage, WriteMessage},
    serialize::Args,
    stream::DuplexStream,
};

/// Observable client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Connected, with at least one call waiting for its response
    AwaitingResponse,
    /// Connection broke. Requires a new [RpcClient::connect]
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Disconnected,
    Connected,
    Failed,
}

struct Session {
    state: SessionState,
    stream: Option<DuplexStream>,
    /// Last used request id. Never reset
    last_id: i64,
    /// Depth of nested calls
    in_flight: usize,
}

type DisconnectObserver = Arc<dyn Fn() + Send + Sync>;

struct ClientInner {
    connector: Box<dyn Connector>,
    /// Reentrant, so callbacks can make calls on the thread which dispatches them.
    /// `RefCell` borrows are never held across callback dispatch
    session: ReentrantMutex<RefCell<Session>>,
    callbacks: CallbackRegistry,
    wrappers: WrapperRegistry,
    disconnect_observers: Mutex<Vec<DisconnectObserver>>,
    token_counter: AtomicU64,
    #[cfg(feature = "monitor")]
    monitor: Option<Arc<dyn Monitor>>,
}

/// Client builder
pub struct RpcClientBuilder {
    connector: Box<dyn Connector>,
    wrappers: WrapperRegistry,
    #[cfg(feature = "monitor")]
    monitor: Option<Arc<dyn Monitor>>,
}

impl RpcClientBuilder {
    pub fn new<C: Connector + 'static>(connector: C) -> Self {
        Self {
            connector: Box::new(connector),
            wrappers: WrapperRegistry::new(),
            #[cfg(feature = "monitor")]
            monitor: None,
        }
    }

    /// Register a wrapper factory for handles with `type_id` tag
    pub fn wrapper<F, W>(self, type_id: &str, factory: F) -> Self
    where
        F: Fn(crate::Handle, &RpcClient) -> W + Send + Sync + 'static,
        W: RemoteObject,
    {
        self.wrappers.register(type_id, factory);
        self
    }

    /// Install [crate::collections::RemoteList] and [crate::collections::RemoteDict] wrappers
    pub fn collection_wrappers(self) -> Self {
        crate::collections::register_collection_wrappers(&self.wrappers);
        self
    }

    #[cfg(feature = "monitor")]
    pub fn monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn build(self) -> RpcClient {
        RpcClient {
            inner: Arc::new(ClientInner {
                connector: self.connector,
                session: ReentrantMutex::new(RefCell::new(Session {
                    state: SessionState::Disconnected,
                    stream: None,
                    last_id: 0,
                    in_flight: 0,
                })),
                callbacks: CallbackRegistry::new(),
                wrappers: self.wrappers,
                disconnect_observers: Mutex::new(Vec::new()),
                token_counter: AtomicU64::new(0),
                #[cfg(feature = "monitor")]
                monitor: self.monitor,
            }),
        }
    }
}

/// Capability RPC client.
/// Calls block the calling thread until the response arrives. Host callbacks are
/// dispatched on the same thread while it waits. Clones share the connection
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    /// Make a client for an endpoint from `config`. Doesn't connect
    pub fn new(config: &ClientConfig) -> Self {
        Self::builder(EndpointConnector::new(
            &config.endpoint,
            config.connect_options(),
        ))
        .build()
    }

    pub fn builder<C: Connector + 'static>(connector: C) -> RpcClientBuilder {
        RpcClientBuilder::new(connector)
    }

    /// Callback registry to register functions the host can invoke
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.inner.callbacks
    }

    /// Wrapper registry used to unwrap handles
    pub fn wrappers(&self) -> &WrapperRegistry {
        &self.inner.wrappers
    }

    /// Shortcut for [CallbackRegistry::register]
    pub fn register_callback<F>(&self, callback: F) -> String
    where
        F: Fn(&RpcClient, Vec<RemoteValue>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.inner.callbacks.register(callback)
    }

    /// Shortcut for [CallbackRegistry::unregister]
    pub fn unregister_callback(&self, callback_id: &str) -> bool {
        self.inner.callbacks.unregister(callback_id)
    }

    /// Shortcut for [WrapperRegistry::register]
    pub fn register_wrapper<F, W>(&self, type_id: &str, factory: F)
    where
        F: Fn(crate::Handle, &RpcClient) -> W + Send + Sync + 'static,
        W: RemoteObject,
    {
        self.inner.wrappers.register(type_id, factory)
    }

    pub fn state(&self) -> ConnectionState {
        let guard = self.inner.session.lock();
        let session = guard.borrow();

        match session.state {
            SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Failed => ConnectionState::Failed,
            SessionState::Connected if session.in_flight > 0 => ConnectionState::AwaitingResponse,
            SessionState::Connected => ConnectionState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::AwaitingResponse
        )
    }

    /// Open the connection. Does nothing if already connected
    pub fn connect(&self) -> crate::Result<()> {
        let guard = self.inner.session.lock();

        if guard.borrow().state == SessionState::Connected {
            return Ok(());
        }

        let stream = self.inner.connector.connect()?;
        info!("Connected to the host at `{}`", stream.endpoint());

        let mut session = guard.borrow_mut();
        session.stream = Some(stream);
        session.state = SessionState::Connected;

        Ok(())
    }

    /// Close the connection and notify disconnect observers. Never fails
    pub fn disconnect(&self) {
        let guard = self.inner.session.lock();

        let was_connected = {
            let mut session = guard.borrow_mut();
            let was_connected = session.state == SessionState::Connected;

            session.state = SessionState::Disconnected;
            if let Some(mut stream) = session.stream.take() {
                stream.close()
            }

            was_connected
        };

        if was_connected {
            info!("Disconnected from the host");
            self.notify_disconnected();
        }
    }

    /// Add an observer, which is called once the connection is closed or lost
    pub fn on_disconnect<F: Fn() + Send + Sync + 'static>(&self, observer: F) {
        self.inner.disconnect_observers.lock().push(Arc::new(observer))
    }

    /// Invoke a host capability.
    /// Returns the result, wrapped if it's a handle with a registered wrapper
    pub fn invoke_capability(&self, capability_id: &str, args: Args) -> crate::Result<RemoteValue> {
        let args = args.to_wire()?;
        debug!("Invoking `{capability_id}` with {args}");

        let result = self.call(
            INVOKE_CAPABILITY_METHOD,
            vec![Value::String(capability_id.to_owned()), args],
        )?;

        if let Some(error) = CapabilityError::from_result(&result) {
            debug!("`{capability_id}` returned an error: {error}");
            return Err(crate::Error::Capability(error));
        }

        Ok(self.inner.wrappers.wrap_if_handle(result, self))
    }

    /// Ask the host to cancel the token `token_id`. Returns the host acknowledgement
    pub fn cancel_token(&self, token_id: &str) -> crate::Result<bool> {
        debug!("Cancelling token {token_id}");

        let result = self.call(CANCEL_TOKEN_METHOD, vec![Value::String(token_id.to_owned())])?;

        if let Some(error) = CapabilityError::from_result(&result) {
            return Err(crate::Error::Capability(error));
        }

        Ok(result.as_bool().unwrap_or(false))
    }

    /// Give `token` an id to pass to the host. Cancelling the token sends
    /// [RpcClient::cancel_token] for the id. The token doesn't keep the client alive
    pub fn link_cancellation(&self, token: &CancellationToken) -> String {
        let counter = self.inner.token_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let token_id = format!("ct_{counter}_{millis}");

        let client: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let callback_token_id = token_id.clone();

        token.register(move || {
            let Some(inner) = client.upgrade() else {
                return;
            };

            match (RpcClient { inner }).cancel_token(&callback_token_id) {
                Ok(acknowledged) => {
                    debug!("Token {callback_token_id} cancellation acknowledged: {acknowledged}")
                }
                Err(e) => warn!("Failed to propagate token {callback_token_id} cancellation: {e}"),
            }
        });

        token_id
    }

    /// Send a request and wait for its response, serving host callbacks meanwhile
    fn call(&self, method: &str, params: Vec<Value>) -> crate::Result<Value> {
        let guard = self.inner.session.lock();

        let id = {
            let mut session = guard.borrow_mut();

            if session.state != SessionState::Connected {
                return Err(crate::Error::NotConnected);
            }

            session.last_id += 1;
            session.in_flight += 1;
            session.last_id
        };

        let result = self.round_trip(&guard, RpcMessage::call(id, method, params));

        guard.borrow_mut().in_flight -= 1;

        if let Err(e) = &result {
            if e.is_fatal() {
                self.fail(&guard, e);
            }
        }

        result
    }

    fn round_trip(&self, session: &RefCell<Session>, request: RpcMessage) -> crate::Result<Value> {
        let id = request.id;
        self.write(session, &request)?;

        loop {
            let message = self.read(session)?;

            match message.data {
                RpcData::Call { method, params } => {
                    let reply = self.serve(&method, params);
                    self.write(session, &RpcMessage::response(message.id, reply))?;
                }
                RpcData::Response(response) if message.id == id => {
                    return response.map_err(|e| crate::Error::Capability(e.into()));
                }
                RpcData::Response(_) => {
                    return Err(crate::Error::ProtocolViolation(format!(
                        "Received response {} while waiting for {id}",
                        message.id
                    )));
                }
            }
        }
    }

    /// Handle an inbound request. Errors are sent back to the host
    fn serve(&self, method: &str, params: Vec<Value>) -> Result<Value, WireError> {
        if method != INVOKE_CALLBACK_METHOD {
            warn!("Host called unknown method `{method}`");
            return Err(WireError::new(
                WireError::METHOD_NOT_FOUND,
                &format!("Unknown method `{method}`"),
            ));
        }

        let mut params = params.into_iter();
        let Some(Value::String(callback_id)) = params.next() else {
            return Err(WireError::new(
                WireError::INVALID_PARAMS,
                "Callback id must be a string",
            ));
        };

        self.inner
            .callbacks
            .dispatch(&callback_id, params.next(), self)
            .map_err(|e| {
                warn!("Callback {callback_id} failed: {e}");
                WireError::from(&e)
            })
    }

    /// Monitor is notified after the session borrow is released, so it may query the client
    fn write(&self, session: &RefCell<Session>, message: &RpcMessage) -> crate::Result<()> {
        {
            let mut session = session.borrow_mut();
            let stream = session
                .stream
                .as_mut()
                .ok_or(crate::Error::ConnectionClosed)?;

            trace!("Outgoing message: {message:?}");
            stream.write_message(message)?;
        }

        #[cfg(feature = "monitor")]
        if let Some(monitor) = &self.inner.monitor {
            monitor.message(message, Direction::Outgoing);
        }

        Ok(())
    }

    fn read(&self, session: &RefCell<Session>) -> crate::Result<RpcMessage> {
        let message = {
            let mut session = session.borrow_mut();
            let stream = session
                .stream
                .as_mut()
                .ok_or(crate::Error::ConnectionClosed)?;

            stream.read_message()?
        };
        trace!("Incoming message: {message:?}");

        #[cfg(feature = "monitor")]
        if let Some(monitor) = &self.inner.monitor {
            monitor.message(&message, Direction::Incoming);
        }

        Ok(message)
    }

    /// Drop a broken connection
    fn fail(&self, session: &RefCell<Session>, error: &crate::Error) {
        let was_connected = {
            let mut session = session.borrow_mut();

            if session.state != SessionState::Connected {
                false
            } else {
                session.state = SessionState::Failed;
                if let Some(mut stream) = session.stream.take() {
                    stream.close()
                }

                true
            }
        };

        if was_connected {
            warn!("Connection to the host failed: {error}");
            self.notify_disconnected();
        }
    }

    fn notify_disconnected(&self) {
        let observers = self.inner.disconnect_observers.lock().clone();

        for observer in observers {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer())) {
                warn!(
                    "Disconnect observer panicked: {}",
                    panic_message(&panic)
                );
            }
        }
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient").finish_non_exhaustive()
    }
}
