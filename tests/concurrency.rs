//! Mock-server behavior under concurrent client load, and quiesce checks
//! between tests.

mod harness;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use harness::get;
use testbench::{
    BoxError, DISPATCH_THREAD_TOKEN, MIME_HTML, MIME_PLAINTEXT, MockServer, PortRange, Responder,
    Response, WorkerPlan, run_with_barrier, threads,
};

/// After every test, that test's background dispatch work must be gone.
///
/// The check is scoped to the server's port-specific thread name so tests
/// running in parallel never observe each other's dispatchers.
fn assert_quiesced(port: u16) {
    let name = format!("{DISPATCH_THREAD_TOKEN}-{port}");
    threads::wait_for_thread_substring_timeout(&name, std::time::Duration::from_secs(2));
    threads::assert_no_thread("dispatcher still running", &name).unwrap();
}

#[test]
fn test_fixed_response_under_parallel_load() {
    harness::init_tracing();
    let server = MockServer::start_in_range(
        Responder::Fixed(Response::new(200, MIME_PLAINTEXT, "steady")),
        PortRange::new(15300, 15310),
    )
    .unwrap();
    let port = server.port();

    WorkerPlan::new(4, 25)
        .unwrap()
        .with_label("parallel GETs")
        .execute(|_, _| {
            let response = get(port)?;
            if response.status != 200 || response.body != "steady" {
                return Err(format!("unexpected response: {response:?}").into());
            }
            Ok(())
        })
        .unwrap();

    drop(server);
    assert_quiesced(port);
}

#[test]
fn test_hook_fires_once_per_request() {
    harness::init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let server = MockServer::start_in_range(
        Responder::FixedWithHook {
            hook: Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            response: Response::new(200, MIME_HTML, "<html>1</html>"),
        },
        PortRange::new(15310, 15320),
    )
    .unwrap();

    for _ in 0..10 {
        let response = get(server.port()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<html>1</html>");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 10);

    let port = server.port();
    drop(server);
    assert_quiesced(port);
}

#[test]
fn test_computed_responder_sees_each_request() {
    harness::init_tracing();
    let server = MockServer::start_in_range(
        Responder::Computed(Box::new(|request| {
            Ok(Response::ok(format!("{} {}", request.method, request.path)))
        })),
        PortRange::new(15320, 15330),
    )
    .unwrap();

    let response = harness::get_path(server.port(), "/first").unwrap();
    assert_eq!(response.body, "GET /first");
    let response = harness::get_path(server.port(), "/second").unwrap();
    assert_eq!(response.body, "GET /second");

    let port = server.port();
    drop(server);
    assert_quiesced(port);
}

#[test]
fn test_closed_server_never_serves_canned_success() {
    harness::init_tracing();
    let mut server = MockServer::start_in_range(
        Responder::Fixed(Response::ok("canned success")),
        PortRange::new(15330, 15340),
    )
    .unwrap();
    let port = server.port();

    assert_eq!(get(port).unwrap().body, "canned success");
    server.close();

    match get(port) {
        Err(_) => {}
        Ok(response) => assert!(
            !response.body.contains("canned success"),
            "closed server served its canned response"
        ),
    }
    assert_quiesced(port);
}

#[test]
fn test_barrier_synchronized_requests() {
    harness::init_tracing();
    let server = MockServer::start_in_range(
        Responder::Fixed(Response::ok("sync")),
        PortRange::new(15340, 15350),
    )
    .unwrap();
    let port = server.port();

    let results = run_with_barrier(
        move || {
            let response = get(port)?;
            Ok::<u16, BoxError>(response.status)
        },
        8,
    )
    .unwrap();

    assert_eq!(results, vec![200; 8]);

    drop(server);
    assert_quiesced(port);
}

#[test]
fn test_multiple_servers_are_independent() {
    harness::init_tracing();
    let range = PortRange::new(15350, 15360);
    let first =
        MockServer::start_in_range(Responder::Fixed(Response::ok("first")), range).unwrap();
    let second =
        MockServer::start_in_range(Responder::Fixed(Response::ok("second")), range).unwrap();

    assert_ne!(first.port(), second.port());
    assert_eq!(get(first.port()).unwrap().body, "first");
    assert_eq!(get(second.port()).unwrap().body, "second");

    let (first_port, second_port) = (first.port(), second.port());
    drop(first);
    assert_quiesced(first_port);
    assert_eq!(get(second_port).unwrap().body, "second");

    drop(second);
    assert_quiesced(second_port);
}

#[test]
fn test_default_range_is_used_by_convenience_constructors() {
    harness::init_tracing();
    let server = MockServer::fixed(200, MIME_PLAINTEXT, "OK").unwrap();
    let range = PortRange::default();
    assert!(server.port() >= range.start && server.port() < range.end);
    assert_eq!(get(server.port()).unwrap().body, "OK");

    let port = server.port();
    drop(server);
    assert_quiesced(port);
}
