/*!
Capability-based RPC client used to drive a host process over a local duplex stream.

The library:
- Connects to a Unix domain socket or a Windows named pipe and frames messages with `Content-Length` headers;
- Invokes host capabilities by id with named arguments. Host objects come back as [Handle]s and are wrapped into typed facades registered in a [WrapperRegistry];
- Serves host callbacks while waiting for a response. Callbacks may call back into the host on the same thread;
- Propagates [CancellationToken] cancellations to the host;
- Supports message exchange monitoring via [monitor::Monitor]

Calls are synchronous. There is no background reader: the calling thread reads the stream
until its response arrives, dispatching incoming callback requests on the way.

# Examples

Capability calls:
```
use caplink_rpc::{Args, ClientConfig, RpcClient};

fn call() -> caplink_rpc::Result<()> {
    let client = RpcClient::new(&ClientConfig::new("/tmp/host.sock"));
    client.connect()?;

    let greeting = client.invoke_capability("greet", Args::new().with("name", "world"))?;
    println!("Host replied: {greeting:?}");

    client.disconnect();
    Ok(())
}
```

Host callbacks:
```
use serde_json::json;

use caplink_rpc::{Args, ClientConfig, RpcClient};

fn subscribe() -> caplink_rpc::Result<()> {
    let client = RpcClient::new(&ClientConfig::new("/tmp/host.sock"));
    client.connect()?;

    let callback_id = client.register_callback(|_client, args| {
        println!("Host event: {args:?}");
        Ok(json!(true))
    });

    // The host may invoke the callback before this call returns
    client.invoke_capability("events.subscribe", Args::new().with("callback", callback_id.as_str()))?;
    Ok(())
}
```

Host collections:
```
use caplink_rpc::{collections::RemoteList, Args, EndpointConnector, RpcClient};

fn fill() -> caplink_rpc::Result<()> {
    let client = RpcClient::builder(EndpointConnector::new("/tmp/host.sock", Default::default()))
        .collection_wrappers()
        .build();
    client.connect()?;

    let list = client.invoke_capability("store.list", Args::new())?;
    if let Some(list) = list.downcast_ref::<RemoteList>() {
        list.add(42)?;
        println!("List length: {}", list.length()?);
    }

    Ok(())
}
```

See `tests/` for more examples.
*/

mod callback_registry;
mod cancellation;
pub mod collections;
mod config;
mod connector;
mod error;
mod expression;
mod handle;
#[cfg(feature = "log-to-stdout")]
mod log_macros;
pub mod message;
pub mod message_stream;
#[cfg(feature = "monitor")]
pub mod monitor;
pub mod rpc;
mod serialize;
pub mod stream;

pub use callback_registry::{CallbackRegistry, Completion};
pub use cancellation::CancellationToken;
pub use config::ClientConfig;
pub use connector::{Connector, EndpointConnector, OneTimeConnector};
pub use error::*;
pub use expression::{ReferenceExpression, ReferenceExpressionBuilder, EXPRESSION_KEY};
pub use handle::{
    is_marshalled_handle, Handle, RemoteObject, RemoteValue, WrapperFactory, WrapperRegistry,
    HANDLE_KEY, TYPE_KEY,
};
pub use rpc::{ConnectionState, RpcClient, RpcClientBuilder};
pub use serialize::{extract_reference_value, serialize, Args, Param, Serializable};
pub use stream::{ConnectOptions, DuplexStream, Transport};
