use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lantern::http::connection::Service;
use lantern::server::dispatcher::{Dispatcher, DispatcherHandle};
use lantern::server::listener::bind;

const SCENARIO_GET: &[u8] = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";

fn new_dispatcher() -> Dispatcher {
    let listener = bind("127.0.0.1:0".parse().unwrap(), 128).unwrap();
    Dispatcher::new(listener, Service::default()).unwrap()
}

fn start() -> (SocketAddr, DispatcherHandle, JoinHandle<io::Result<()>>) {
    let mut dispatcher = new_dispatcher();
    let addr = dispatcher.local_addr().unwrap();
    let handle = dispatcher.handle();
    let thread = thread::spawn(move || dispatcher.run());
    (addr, handle, thread)
}

fn stop(handle: DispatcherHandle, thread: JoinHandle<io::Result<()>>) {
    handle.stop().unwrap();
    thread.join().unwrap().unwrap();
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

fn read_response(mut stream: TcpStream) -> String {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = connect(addr);
    stream.write_all(request).unwrap();
    read_response(stream)
}

#[test]
fn test_get_over_socket() {
    let (addr, handle, thread) = start();

    let response = roundtrip(addr, SCENARIO_GET);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("\r\nContent-Length: 71\r\n"));
    assert!(response.ends_with("<body>Index page</body></html>"));

    stop(handle, thread);
}

#[test]
fn test_post_over_socket_closes_after_response() {
    let (addr, handle, thread) = start();

    let response = roundtrip(addr, b"POST / HTTP/1.1\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 403 Forbidden\r\n"));

    stop(handle, thread);
}

#[test]
fn test_garbage_over_socket() {
    let (addr, handle, thread) = start();

    let response = roundtrip(addr, b"GARBAGE\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

    stop(handle, thread);
}

#[test]
fn test_terminator_trickled_byte_by_byte() {
    let (addr, handle, thread) = start();
    let mut stream = connect(addr);

    let (prefix, tail) = SCENARIO_GET.split_at(SCENARIO_GET.len() - 8);
    stream.write_all(prefix).unwrap();
    for byte in tail {
        thread::sleep(Duration::from_millis(5));
        stream.write_all(std::slice::from_ref(byte)).unwrap();
    }

    assert!(read_response(stream).starts_with("HTTP/1.1 200 OK\r\n"));
    stop(handle, thread);
}

#[test]
fn test_slow_client_does_not_block_others() {
    let (addr, handle, thread) = start();

    let mut slow = connect(addr);
    slow.write_all(b"GET / HTTP/1.1\r\n").unwrap();
    thread::sleep(Duration::from_millis(20));

    let fast = roundtrip(addr, SCENARIO_GET);
    assert!(fast.starts_with("HTTP/1.1 200 OK\r\n"));

    slow.write_all(b"Host: x\r\n\r\n").unwrap();
    assert!(read_response(slow).starts_with("HTTP/1.1 200 OK\r\n"));

    stop(handle, thread);
}

#[test]
fn test_concurrent_clients_get_identical_responses() {
    let (addr, handle, thread) = start();

    let clients: Vec<_> = (0..16)
        .map(|_| thread::spawn(move || roundtrip(addr, SCENARIO_GET)))
        .collect();
    let responses: Vec<String> = clients.into_iter().map(|c| c.join().unwrap()).collect();

    // Only the Date header may differ between them.
    let strip_date = |r: &str| -> String {
        r.split("\r\n")
            .filter(|line| !line.starts_with("Date: "))
            .collect::<Vec<_>>()
            .join("\r\n")
    };
    for response in &responses {
        assert_eq!(strip_date(response), strip_date(&responses[0]));
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    stop(handle, thread);
}

#[test]
fn test_disconnect_mid_head_releases_connection() {
    let mut dispatcher = new_dispatcher();
    let addr = dispatcher.local_addr().unwrap();

    let mut client = connect(addr);
    client.write_all(b"GET / HT").unwrap();

    let mut seen_open = false;
    for _ in 0..20 {
        dispatcher.turn(Some(Duration::from_millis(50))).unwrap();
        if dispatcher.connection_count() == 1 {
            seen_open = true;
            break;
        }
    }
    assert!(seen_open, "connection was never accepted");

    drop(client);

    for _ in 0..20 {
        dispatcher.turn(Some(Duration::from_millis(50))).unwrap();
        if dispatcher.connection_count() == 0 {
            break;
        }
    }
    assert_eq!(dispatcher.connection_count(), 0);
}

#[test]
fn test_stop_returns_from_run() {
    let (addr, handle, thread) = start();
    let _idle = connect(addr);

    thread::sleep(Duration::from_millis(20));
    stop(handle, thread);
}
