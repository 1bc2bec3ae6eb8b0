use std::collections::HashSet;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use lantern::server::worker::WorkerPool;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn server_args(port: u16) -> Vec<OsString> {
    ["--host", "127.0.0.1", "--port", &port.to_string(), "--log", "warn"]
        .iter()
        .map(OsString::from)
        .collect()
}

async fn wait_until_listening(addr: SocketAddr) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no worker listening on {addr}");
}

fn get_index(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).unwrap();
    out
}

// Every worker binds the shared port; which of them accepts each client is up
// to the kernel, so this checks the pool as a whole rather than each worker.
#[tokio::test(flavor = "multi_thread")]
async fn test_pool_of_four_serves_concurrently() {
    let port = free_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let pool = WorkerPool::new(env!("CARGO_BIN_EXE_lantern"), server_args(port), 4);
    assert_eq!(pool.size(), 4);

    let mut running = pool.spawn().unwrap();
    assert_eq!(running.len(), 4);
    assert_eq!(running.pids().into_iter().collect::<HashSet<_>>().len(), 4);

    wait_until_listening(addr).await;

    let responses = tokio::task::spawn_blocking(move || {
        let clients: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(move || get_index(addr)))
            .collect();
        clients
            .into_iter()
            .map(|c| c.join().unwrap())
            .collect::<Vec<_>>()
    })
    .await
    .unwrap();

    for response in &responses {
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("\r\nContent-Length: 71\r\n"));
    }
    assert_eq!(running.running(), 4);

    running.shutdown().await;
    assert_eq!(running.running(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_workers_are_reported_not_restarted() {
    let args = vec![OsString::from("-c"), OsString::from("exit 3"), OsString::from("sh")];
    let pool = WorkerPool::new("sh", args, 2);

    let mut running = pool.spawn().unwrap();
    let failed = running.wait().await;

    assert_eq!(failed, 2);
    assert_eq!(running.running(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_sibling_survives_a_crashed_worker() {
    let port = free_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let mut healthy = WorkerPool::new(env!("CARGO_BIN_EXE_lantern"), server_args(port), 1)
        .spawn()
        .unwrap();
    let mut crashed = WorkerPool::new("sh", vec!["-c".into(), "exit 1".into(), "sh".into()], 1)
        .spawn()
        .unwrap();

    assert_eq!(crashed.wait().await, 1);
    wait_until_listening(addr).await;

    let response = tokio::task::spawn_blocking(move || get_index(addr)).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(healthy.running(), 1);

    healthy.shutdown().await;
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_killed_worker_is_not_restarted_and_siblings_keep_serving() {
    let port = free_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let mut running = WorkerPool::new(env!("CARGO_BIN_EXE_lantern"), server_args(port), 2)
        .spawn()
        .unwrap();
    wait_until_listening(addr).await;
    assert_eq!(running.running(), 2);

    let victim = running.pids()[0];
    let status = std::process::Command::new("kill")
        .args(["-9", &victim.to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    for _ in 0..100 {
        if running.running() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(running.running(), 1);

    let responses = tokio::task::spawn_blocking(move || {
        (0..8).map(|_| get_index(addr)).collect::<Vec<_>>()
    })
    .await
    .unwrap();
    for response in &responses {
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(running.running(), 1);
    assert_eq!(running.len(), 2);

    running.shutdown().await;
}
