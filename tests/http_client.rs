//! Integration tests for the shared HTTP client manager
//!
//! Fixtures are real TCP listeners: transport failures are simulated by
//! accepting and immediately dropping the connection, HTTP-level responses
//! by writing raw HTTP/1.1 bytes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use tally::client::{headers_from_pairs, ClientConfig, HttpClientManager, RequestOptions};
use tally::types::TallyError;

fn test_config() -> ClientConfig {
    ClientConfig {
        timeout_total: Duration::from_secs(5),
        timeout_connect: Duration::from_secs(2),
        timeout_read: Duration::from_secs(5),
        backoff_base: 0.01,
        retries: 3,
        max_in_flight: 10,
        shutdown_timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    }
}

async fn read_request_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let response = format!(
        "HTTP/1.1 {} OK\r\ncontent-length: {}\r\ncontent-type: application/json\r\nconnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Server that drops the first `fail_count` connections (transport failure),
/// then serves 200s. Returns the address, an accept counter, and accept
/// timestamps for backoff measurements.
async fn spawn_flaky_server(
    fail_count: usize,
) -> (SocketAddr, Arc<AtomicUsize>, Arc<Mutex<Vec<Instant>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let stamps = Arc::new(Mutex::new(Vec::new()));

    let accepts_clone = Arc::clone(&accepts);
    let stamps_clone = Arc::clone(&stamps);
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let n = accepts_clone.fetch_add(1, Ordering::SeqCst) + 1;
            stamps_clone.lock().await.push(Instant::now());

            if n <= fail_count {
                // Drop before any HTTP exchange: transport-level failure
                drop(stream);
                continue;
            }
            let _ = read_request_head(&mut stream).await;
            write_response(&mut stream, 200, "{\"ok\":true}").await;
        }
    });

    (addr, accepts, stamps)
}

/// Server that always answers with the given status, counting requests
async fn spawn_status_server(status: u16) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));

    let requests_clone = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let requests = Arc::clone(&requests_clone);
            tokio::spawn(async move {
                let _ = read_request_head(&mut stream).await;
                requests.fetch_add(1, Ordering::SeqCst);
                write_response(&mut stream, status, "{\"error\":\"boom\"}").await;
            });
        }
    });

    (addr, requests)
}

/// Server that captures request heads and answers 200
async fn spawn_echo_server() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));

    let captured_clone = Arc::clone(&captured);
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let head = read_request_head(&mut stream).await;
            captured_clone.lock().await.push(head);
            write_response(&mut stream, 200, "{}").await;
        }
    });

    (addr, captured)
}

/// Server that holds each request for `delay`, tracking peak concurrency
async fn spawn_slow_server(delay: Duration) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peak = Arc::new(AtomicUsize::new(0));
    let current = Arc::new(AtomicUsize::new(0));

    let peak_clone = Arc::clone(&peak);
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let peak = Arc::clone(&peak_clone);
            let current = Arc::clone(&current);
            tokio::spawn(async move {
                let _ = read_request_head(&mut stream).await;

                let in_flight = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(in_flight, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                current.fetch_sub(1, Ordering::SeqCst);

                write_response(&mut stream, 200, "{}").await;
            });
        }
    });

    (addr, peak)
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let manager = HttpClientManager::new(test_config());

    manager.initialize().await.unwrap();
    let first = manager.health().await;
    assert!(first.active);
    let created_at = first.created_at.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.initialize().await.unwrap();
    let second = manager.health().await;

    // Second call was a no-op: same handle, same creation timestamp
    assert_eq!(second.created_at.unwrap(), created_at);
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let manager = HttpClientManager::new(test_config());

    // Nothing to close: clean no-op
    assert!(manager.shutdown().await);

    manager.initialize().await.unwrap();
    assert!(manager.shutdown().await);
    assert!(manager.shutdown().await);

    let health = manager.health().await;
    assert!(!health.active);
    assert!(health.created_at.is_none());
}

#[tokio::test]
async fn request_fails_before_initialize_and_after_shutdown() {
    let manager = HttpClientManager::new(test_config());

    let err = manager
        .request(Method::GET, "http://127.0.0.1:1/", RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::NotInitialized));

    manager.initialize().await.unwrap();
    manager.shutdown().await;

    let err = manager
        .request(Method::GET, "http://127.0.0.1:1/", RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::NotInitialized));
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let (addr, accepts, _) = spawn_flaky_server(2).await;
    let manager = HttpClientManager::new(test_config());
    manager.initialize().await.unwrap();

    let response = manager
        .request(
            Method::GET,
            &format!("http://{}/metric", addr),
            RequestOptions {
                retries: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    // Two failed connections plus the successful one
    assert_eq!(accepts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_exhaustion_fails_after_exact_attempt_count() {
    let (addr, accepts, _) = spawn_flaky_server(usize::MAX).await;
    let manager = HttpClientManager::new(test_config());
    manager.initialize().await.unwrap();

    let err = manager
        .request(
            Method::GET,
            &format!("http://{}/metric", addr),
            RequestOptions {
                retries: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    match err {
        TallyError::RequestFailed { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected RequestFailed, got {other:?}"),
    }
    assert_eq!(accepts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retries_one_means_single_attempt() {
    let (addr, accepts, _) = spawn_flaky_server(usize::MAX).await;
    let manager = HttpClientManager::new(test_config());
    manager.initialize().await.unwrap();

    let err = manager
        .request(
            Method::GET,
            &format!("http://{}/metric", addr),
            RequestOptions {
                retries: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TallyError::RequestFailed { attempts: 1, .. }));
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http_error_status_is_returned_not_retried() {
    let (addr, requests) = spawn_status_server(500).await;
    let manager = HttpClientManager::new(test_config());
    manager.initialize().await.unwrap();

    let response = manager
        .request(
            Method::GET,
            &format!("http://{}/metric", addr),
            RequestOptions {
                retries: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // The 500 is handed to the caller as a completed response
    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn caller_headers_merge_over_defaults() {
    let (addr, captured) = spawn_echo_server().await;
    let manager = HttpClientManager::new(test_config());
    manager.initialize().await.unwrap();

    let response = manager
        .request(
            Method::GET,
            &format!("http://{}/metric", addr),
            RequestOptions {
                headers: Some(headers_from_pairs(&[
                    ("x-test", "a"),
                    ("content-type", "text/plain"),
                ])),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let heads = captured.lock().await;
    let head = heads.first().unwrap().to_lowercase();

    // Caller header present, default user-agent kept, caller wins on collision
    assert!(head.contains("x-test: a"));
    assert!(head.contains("user-agent: tally/"));
    assert!(head.contains("content-type: text/plain"));
    assert!(!head.contains("application/json"));
}

#[tokio::test]
async fn admission_control_bounds_in_flight_requests() {
    let (addr, peak) = spawn_slow_server(Duration::from_millis(300)).await;

    let config = ClientConfig {
        max_in_flight: 2,
        ..test_config()
    };
    let manager = Arc::new(HttpClientManager::new(config));
    manager.initialize().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let manager = Arc::clone(&manager);
        let url = format!("http://{}/slow", addr);
        handles.push(tokio::spawn(async move {
            manager
                .request(Method::GET, &url, RequestOptions::default())
                .await
        }));
    }

    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    // The third request was only admitted after a permit freed up
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn backoff_grows_exponentially_between_attempts() {
    let (addr, _, stamps) = spawn_flaky_server(usize::MAX).await;
    let manager = HttpClientManager::new(test_config());
    manager.initialize().await.unwrap();

    let err = manager
        .request(
            Method::GET,
            &format!("http://{}/metric", addr),
            RequestOptions {
                retries: Some(3),
                backoff_base: Some(1.5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::RequestFailed { attempts: 3, .. }));

    let stamps = stamps.lock().await;
    assert_eq!(stamps.len(), 3);

    // Sleeps are base^1 then base^2: ~1.5s and ~2.25s
    let gap1 = stamps[1].duration_since(stamps[0]).as_secs_f64();
    let gap2 = stamps[2].duration_since(stamps[1]).as_secs_f64();

    assert!((1.3..2.2).contains(&gap1), "first backoff was {gap1}s");
    assert!((2.0..3.2).contains(&gap2), "second backoff was {gap2}s");
    assert!(gap2 > gap1);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_requests() {
    let (addr, _) = spawn_slow_server(Duration::from_millis(400)).await;
    let manager = Arc::new(HttpClientManager::new(test_config()));
    manager.initialize().await.unwrap();

    let request = {
        let manager = Arc::clone(&manager);
        let url = format!("http://{}/slow", addr);
        tokio::spawn(async move {
            manager
                .request(Method::GET, &url, RequestOptions::default())
                .await
        })
    };

    // Let the request get past admission before closing
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    assert!(manager.shutdown().await);
    // Shutdown blocked until the in-flight request drained
    assert!(started.elapsed() >= Duration::from_millis(200));

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn shutdown_reports_unclean_close_on_drain_timeout() {
    let (addr, _) = spawn_slow_server(Duration::from_secs(2)).await;

    let config = ClientConfig {
        shutdown_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let manager = Arc::new(HttpClientManager::new(config));
    manager.initialize().await.unwrap();

    let _request = {
        let manager = Arc::clone(&manager);
        let url = format!("http://{}/slow", addr);
        tokio::spawn(async move {
            manager
                .request(Method::GET, &url, RequestOptions::default())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Drain cannot finish in time; close is absorbed, not raised
    assert!(!manager.shutdown().await);
    assert!(!manager.health().await.active);
}
