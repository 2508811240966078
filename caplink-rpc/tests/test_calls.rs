#![cfg(unix)]

use std::thread;

use serde_json::{json, Value};

use caplink_rpc::{
    collections::RemoteList,
    message::{WireError, CANCEL_TOKEN_METHOD},
    Args, CancellationToken, ConnectionState, Error, Handle, ReferenceExpression, RemoteObject,
    RemoteValue,
};

mod implementations;

use implementations::fake_host::client_pair;

fn init_logger() {
    let _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

#[test]
fn test_list_add() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    let host = thread::spawn(move || {
        let (id, args) = host.expect_capability("List.add");
        assert_eq!(id, 1);
        assert_eq!(
            args,
            json!({"list": {"$handle": "h1", "$type": "List"}, "item": 3})
        );

        host.respond(id, Value::Null);
    });

    let result = client
        .invoke_capability(
            "List.add",
            Args::new()
                .with("list", Handle::new("h1", "List"))
                .with("item", 3),
        )
        .unwrap();

    assert!(result.is_null());
    assert_eq!(client.state(), ConnectionState::Connected);

    host.join().unwrap();
}

#[test]
fn test_request_ids_increase() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    let host = thread::spawn(move || {
        for expected_id in 1..=3 {
            let (id, _) = host.expect_capability("echo");
            assert_eq!(id, expected_id);

            host.respond(id, json!(id * 10));
        }
    });

    for i in 1..=3 {
        let result = client
            .invoke_capability("echo", Args::new().with("value", i))
            .unwrap();
        assert_eq!(result, json!(i * 10));
    }

    host.join().unwrap();
}

#[test]
fn test_transport_error() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    let host = thread::spawn(move || {
        let (id, _) = host.expect_capability("missing");

        host.respond_error(
            id,
            WireError {
                code: "CAPABILITY_NOT_FOUND".into(),
                message: "No such capability".into(),
                data: Some(json!({"capability": "missing"})),
            },
        );
    });

    match client.invoke_capability("missing", Args::new()) {
        Err(Error::Capability(error)) => {
            assert_eq!(error.code, "CAPABILITY_NOT_FOUND");
            assert_eq!(error.capability.as_deref(), Some("missing"));
            assert_eq!(error.message, "No such capability");
        }
        other => panic!("Unexpected result: {other:?}"),
    }

    // Capability errors don't break the connection
    assert!(client.is_connected());

    host.join().unwrap();
}

#[test]
fn test_error_result() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    let host = thread::spawn(move || {
        let (id, _) = host.expect_capability("List.get");

        host.respond(
            id,
            json!({"$error": {"code": "INDEX_OUT_OF_RANGE", "message": "Index 5 is out of range", "capability": "List.get"}}),
        );
    });

    let result = client.invoke_capability(
        "List.get",
        Args::new()
            .with("list", Handle::new("h1", "List"))
            .with("index", 5),
    );

    match result {
        Err(Error::Capability(error)) => {
            assert_eq!(error.code, "INDEX_OUT_OF_RANGE");
            assert_eq!(error.capability.as_deref(), Some("List.get"));
            assert_eq!(
                error.to_string(),
                "[INDEX_OUT_OF_RANGE] List.get: Index 5 is out of range"
            );
        }
        other => panic!("Unexpected result: {other:?}"),
    }

    host.join().unwrap();
}

#[test]
fn test_handle_wrapping() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.collection_wrappers().build();
    client.connect().unwrap();

    let host = thread::spawn(move || {
        let (id, _) = host.expect_capability("store.list");
        host.respond(id, json!({"$handle": "h1", "$type": "List"}));

        let (id, args) = host.expect_capability("List.length");
        assert_eq!(args, json!({"list": {"$handle": "h1", "$type": "List"}}));
        host.respond(id, json!(2));

        let (id, _) = host.expect_capability("store.unknown");
        host.respond(id, json!({"$handle": "h2", "$type": "Unregistered"}));
    });

    let list = client.invoke_capability("store.list", Args::new()).unwrap();
    let list = list.downcast_ref::<RemoteList>().unwrap();

    assert_eq!(list.handle().handle_id(), "h1");
    assert_eq!(list.length().unwrap(), 2);

    // No wrapper for the type: bare handle
    let unknown = client.invoke_capability("store.unknown", Args::new()).unwrap();
    assert!(matches!(unknown, RemoteValue::Handle(ref handle) if handle.handle_id() == "h2"));

    host.join().unwrap();
}

#[test]
fn test_reference_expression_argument() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    let host = thread::spawn(move || {
        let (id, args) = host.expect_capability("env.set");
        assert_eq!(
            args,
            json!({"value": {"$expr": {"format": "http://{0}:{1}", "valueProviders": [{"$handle": "h1", "$type": "Endpoint"}, 8080]}}})
        );

        host.respond(id, json!(true));
    });

    let expression = ReferenceExpression::create(
        "http://{0}:{1}",
        &[Handle::new("h1", "Endpoint").into(), 8080.into()],
    )
    .unwrap();

    let result = client
        .invoke_capability("env.set", Args::new().with("value", expression))
        .unwrap();
    assert_eq!(result, json!(true));

    host.join().unwrap();
}

#[test]
fn test_cancellation() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    let token = CancellationToken::new();
    let token_id = client.link_cancellation(&token);
    assert!(token_id.starts_with("ct_1_"));

    let host_token_id = token_id.clone();
    let host = thread::spawn(move || {
        let (id, params) = host.expect_call(CANCEL_TOKEN_METHOD);
        assert_eq!(params, vec![json!(host_token_id)]);

        host.respond(id, json!(true));

        let (id, params) = host.expect_call(CANCEL_TOKEN_METHOD);
        assert_eq!(params, vec![json!("ct_unknown")]);

        host.respond(id, json!(false));
    });

    token.cancel();
    assert!(token.is_cancelled());

    assert!(!client.cancel_token("ct_unknown").unwrap());

    host.join().unwrap();
}

#[test]
fn test_concurrent_callers() {
    init_logger();

    const THREADS: i64 = 4;
    const CALLS: i64 = 5;

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    // Echo host. Calls are serialized, so one request is outstanding at a time
    let host = thread::spawn(move || {
        for _ in 0..THREADS * CALLS {
            let (id, args) = host.expect_capability("echo");
            host.respond(id, args["value"].clone());
        }
    });

    let callers = (0..THREADS)
        .map(|caller| {
            let client = client.clone();

            thread::spawn(move || {
                for call in 0..CALLS {
                    let value = caller * 100 + call;
                    let result = client
                        .invoke_capability("echo", Args::new().with("value", value))
                        .unwrap();

                    assert_eq!(result, json!(value));
                }
            })
        })
        .collect::<Vec<_>>();

    for caller in callers {
        caller.join().unwrap();
    }

    host.join().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test]
fn test_not_connected() {
    init_logger();

    let (builder, _host) = client_pair();
    let client = builder.build();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.invoke_capability("echo", Args::new()),
        Err(Error::NotConnected)
    ));
}

#[test]
fn test_unexpected_response_id() {
    init_logger();

    let (builder, mut host) = client_pair();
    let client = builder.build();
    client.connect().unwrap();

    let host = thread::spawn(move || {
        let (id, _) = host.expect_capability("echo");
        host.respond(id + 41, json!(1));
    });

    assert!(matches!(
        client.invoke_capability("echo", Args::new()),
        Err(Error::ProtocolViolation(_))
    ));
    assert_eq!(client.state(), ConnectionState::Failed);

    host.join().unwrap();
}
