//! Integration tests for PiKV
//!
//! Tests the complete system: server, sessions, client and persistence

use pikv::{
    execute_once, AcceptMode, Client, Command, Engine, PikvError, RetryPolicy, Server,
    ServerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

struct TestServer {
    addr: String,
    server: Arc<Server>,
    handle: JoinHandle<pikv::Result<()>>,
}

impl TestServer {
    async fn stop(self) {
        // serve() may not have subscribed yet
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.server.shutdown().is_err() {
            assert!(tokio::time::Instant::now() < deadline, "server never started");
            sleep(Duration::from_millis(10)).await;
        }
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Start a server on an ephemeral loopback port
async fn start_test_server(engine: Arc<Engine>, mode: AcceptMode) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    start_on(listener, engine, mode)
}

fn start_on(listener: TcpListener, engine: Arc<Engine>, mode: AcceptMode) -> TestServer {
    let addr = listener.local_addr().unwrap().to_string();
    let config = ServerConfig::builder()
        .bind_addr(addr.clone())
        .stats_interval(Duration::from_secs(3600))
        .accept_mode(mode)
        .build();

    let server = Arc::new(Server::new(config, engine));
    let handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    TestServer {
        addr,
        server,
        handle,
    }
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        backoff: Duration::from_millis(50),
        budget: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let server = start_test_server(Arc::new(Engine::new()), AcceptMode::Serial).await;
    let policy = quick_retry();

    // one connection per command, like the command-line client
    let answer = execute_once(&server.addr, &policy, &Command::insert("foo", "bar"))
        .await
        .unwrap();
    assert!(answer.contains("successful"), "{}", answer);

    let answer = execute_once(&server.addr, &policy, &Command::get("foo"))
        .await
        .unwrap();
    assert!(answer.contains("foo") && answer.contains("bar"), "{}", answer);

    let answer = execute_once(&server.addr, &policy, &Command::delete("foo"))
        .await
        .unwrap();
    assert!(answer.contains("successful"), "{}", answer);

    let answer = execute_once(&server.addr, &policy, &Command::get("foo"))
        .await
        .unwrap();
    assert!(answer.contains("not found"), "{}", answer);

    server.stop().await;
}

#[tokio::test]
async fn test_many_requests_on_one_connection() {
    let engine = Arc::new(Engine::new());
    let server = start_test_server(Arc::clone(&engine), AcceptMode::Serial).await;

    let mut client = Client::connect(&server.addr).await.unwrap();
    assert!(client
        .request(&Command::insert("k", "v1"))
        .await
        .unwrap()
        .contains("successful"));
    assert!(client
        .request(&Command::insert("k", "v2"))
        .await
        .unwrap()
        .contains("already exists"));
    assert!(client
        .request(&Command::update("k", "v3"))
        .await
        .unwrap()
        .contains("successful"));
    assert!(client
        .request(&Command::update("absent", "x"))
        .await
        .unwrap()
        .contains("not found"));
    assert!(client
        .request_payload("SHOUT\nk")
        .await
        .unwrap()
        .contains("unknown command"));
    client.close().await.unwrap();

    let stats = engine.stats_snapshot().stats;
    assert_eq!((stats.success_insert, stats.fail_insert), (1, 1));
    assert_eq!((stats.success_update, stats.fail_update), (1, 1));
    assert_eq!(stats.unknown_command, 1);
    assert_eq!(engine.find("k").unwrap().value, "v3");

    server.stop().await;
}

#[tokio::test]
async fn test_client_retries_until_server_starts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = {
        let addr = addr.to_string();
        tokio::spawn(async move {
            execute_once(&addr, &quick_retry(), &Command::insert("late", "riser")).await
        })
    };

    sleep(Duration::from_millis(300)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    let engine = Arc::new(Engine::new());
    let server = start_on(listener, Arc::clone(&engine), AcceptMode::Serial);

    let answer = timeout(Duration::from_secs(10), client)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(answer.contains("successful"));
    assert_eq!(engine.find("late").unwrap().value, "riser");

    server.stop().await;
}

#[tokio::test]
async fn test_client_reports_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let policy = RetryPolicy {
        backoff: Duration::from_millis(50),
        budget: Duration::from_millis(250),
    };
    let err = execute_once(&addr, &policy, &Command::get("k"))
        .await
        .unwrap_err();
    assert!(matches!(err, PikvError::ConnectTimeout { .. }), "{}", err);
}

#[tokio::test]
async fn test_concurrent_clients() {
    let engine = Arc::new(Engine::new());
    let server = start_test_server(Arc::clone(&engine), AcceptMode::Concurrent).await;

    let num_clients = 10;
    let ops_per_client = 20;
    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let addr = server.addr.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(&addr).await.unwrap();

            for i in 0..ops_per_client {
                let key = format!("client_{}_key_{}", client_id, i);
                let answer = client
                    .request(&Command::insert(key.clone(), "v"))
                    .await
                    .unwrap();
                assert!(answer.contains("successful"), "{}", answer);

                let answer = client.request(&Command::get(key.clone())).await.unwrap();
                assert!(answer.contains(&key), "{}", answer);
            }

            client.close().await.unwrap();
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = engine.stats_snapshot();
    assert_eq!(snapshot.records, num_clients * ops_per_client);
    assert_eq!(snapshot.stats.success_insert, (num_clients * ops_per_client) as u64);
    assert_eq!(snapshot.stats.success_get, (num_clients * ops_per_client) as u64);

    server.stop().await;
}

#[tokio::test]
async fn test_persistence_across_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pikv.snapshot");

    // first server instance
    let engine = Arc::new(Engine::new());
    engine.load(&path).unwrap();
    let server = start_test_server(Arc::clone(&engine), AcceptMode::Serial).await;

    let mut client = Client::connect(&server.addr).await.unwrap();
    client.request(&Command::insert("persistent_key1", "one")).await.unwrap();
    client.request(&Command::insert("persistent_key2", "two")).await.unwrap();
    client.request(&Command::delete("persistent_key2")).await.unwrap();
    client.close().await.unwrap();

    server.stop().await;
    engine.save(&path).unwrap();

    // second instance restores from the snapshot
    let engine = Arc::new(Engine::new());
    assert_eq!(engine.load(&path).unwrap(), 1);
    let server = start_test_server(Arc::clone(&engine), AcceptMode::Serial).await;

    let answer = execute_once(&server.addr, &quick_retry(), &Command::get("persistent_key1"))
        .await
        .unwrap();
    assert!(answer.contains("one"), "{}", answer);

    let answer = execute_once(&server.addr, &quick_retry(), &Command::get("persistent_key2"))
        .await
        .unwrap();
    assert!(answer.contains("not found"), "{}", answer);

    server.stop().await;
}

#[tokio::test]
async fn test_special_characters() {
    let server = start_test_server(Arc::new(Engine::new()), AcceptMode::Serial).await;
    let mut client = Client::connect(&server.addr).await.unwrap();

    let key = "ключ_with_特殊字符_🚀";
    let value = "value with\ttabs and \"quotes\"";

    client.request(&Command::insert(key, value)).await.unwrap();
    let answer = client.request(&Command::get(key)).await.unwrap();
    assert!(answer.contains(key) && answer.contains(value), "{}", answer);

    // a newline would split the field and is refused before sending
    let err = client
        .request(&Command::insert("k", "two\nlines"))
        .await
        .unwrap_err();
    assert!(matches!(err, PikvError::InvalidField(_)));

    client.close().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_long_answer_is_truncated_to_one_frame() {
    let engine = Arc::new(Engine::new());
    let server = start_test_server(Arc::clone(&engine), AcceptMode::Serial).await;

    // longer than a frame can carry back, stored directly
    let value = "x".repeat(pikv::FRAME_SIZE * 2);
    assert!(engine.apply(&Command::insert("big", value)).status.is_success());

    let mut client = Client::connect(&server.addr).await.unwrap();
    let answer = client.request(&Command::get("big")).await.unwrap();
    assert!(answer.starts_with("GET successful"));
    assert_eq!(answer.len(), pikv::frame::MAX_PAYLOAD);

    // the session is still usable afterwards
    let answer = client.request(&Command::delete("big")).await.unwrap();
    assert!(answer.contains("successful"));

    client.close().await.unwrap();
    server.stop().await;
}
