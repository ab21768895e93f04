//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Integration tests for the kioken-service crate over loopback sockets

use kioken_pool::PoolConfig;
use kioken_service::{ServerConfig, ServiceError, StatsAggregator, TcpServer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::{Instant, sleep, timeout};

/// Helper to build a loopback configuration
fn test_config(capacity: usize) -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_acceptors(2)
        .with_pool(PoolConfig::new(capacity))
        .with_admission_timeout(Duration::ZERO)
        .with_stats_interval(Duration::from_secs(3600))
}

/// Helper to start a server
async fn start_server(config: ServerConfig) -> TcpServer {
    let server = TcpServer::new(config).await.unwrap();
    server.start(None).unwrap();
    server
}

/// Poll until `condition` holds, panicking after five seconds
async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(10)).await;
    }
}

/// Read until the server closes the connection
///
/// A reset counts as closed: a shed connection may be torn down with data
/// still unread.
async fn closed_by_server(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accounting_balances_after_all_close() {
    let server = start_server(test_config(8)).await;
    let addr = server.local_addr();

    for i in 0..20u8 {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[i; 32]).await.unwrap();
    }

    wait_until("all admissions", || server.total_connections() == 20).await;
    server.pool().wait_idle().await;
    assert_eq!(server.active_connections(), 0);

    assert_eq!(server.pool().stats().rejected, 0);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_window_counts_connections_and_distinct_sources() {
    let server = start_server(test_config(16)).await;
    let addr = server.local_addr();

    let sources = ["127.0.0.1", "127.0.0.2", "127.0.0.3"];
    for i in 0..10 {
        let socket = TcpSocket::new_v4().unwrap();
        let source: SocketAddr = format!("{}:0", sources[i % 3]).parse().unwrap();
        socket.bind(source).unwrap();
        let client = socket.connect(addr).await.unwrap();
        drop(client);
    }

    wait_until("all admissions", || server.total_connections() == 10).await;

    let mut aggregator = StatsAggregator::new(server.stats(), Duration::from_secs(1));
    let snapshot = aggregator.tick_once().await;
    assert_eq!(snapshot.connections_per_sec, 10);
    assert_eq!(snapshot.unique_ips_per_sec, 3);
    assert_eq!(snapshot.total_connections, 10);

    // The next window starts empty
    let snapshot = aggregator.tick_once().await;
    assert_eq!(snapshot.connections_per_sec, 0);
    assert_eq!(snapshot.unique_ips_per_sec, 0);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_pool_sheds_connections() {
    let config = test_config(1).with_admission_timeout(Duration::from_millis(50));
    let server = start_server(config).await;
    let addr = server.local_addr();

    // Occupies the only worker
    let _holder = TcpStream::connect(addr).await.unwrap();
    wait_until("first admission", || server.total_connections() == 1).await;

    let started = Instant::now();
    let mut shed = TcpStream::connect(addr).await.unwrap();
    assert!(closed_by_server(&mut shed).await);
    assert!(started.elapsed() < Duration::from_secs(2));

    wait_until("shed connection released", || server.active_connections() == 1).await;
    assert_eq!(server.total_connections(), 1);
    assert!(server.pool().stats().rejected >= 1);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waiting_connection_is_not_counted_active() {
    let config = test_config(1)
        .with_acceptors(1)
        .with_admission_timeout(Duration::from_secs(5));
    let server = start_server(config).await;
    let addr = server.local_addr();

    let holder = TcpStream::connect(addr).await.unwrap();
    wait_until("first admission", || server.total_connections() == 1).await;
    wait_until("first handler running", || server.active_connections() == 1).await;

    // Accepted but waiting for the only worker
    let _waiting = TcpStream::connect(addr).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.active_connections(), 1);
    assert_eq!(server.total_connections(), 1);

    // Freeing the worker admits the waiting connection
    drop(holder);
    wait_until("second admission", || server.total_connections() == 2).await;
    wait_until("second handler running", || server.active_connections() == 1).await;
    assert!(server.active_connections() <= server.total_connections());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = TcpServer::new(test_config(1)).await.unwrap();
    let taken = first.local_addr();

    let result = TcpServer::new(ServerConfig::new(taken)).await;
    match result {
        Err(ServiceError::Bind { address, .. }) => assert_eq!(address, taken),
        other => panic!("expected bind failure, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_quiet_connection_is_closed_after_read_timeout() {
    let config = test_config(2).with_read_timeout(Duration::from_millis(200));
    let server = start_server(config).await;

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert!(closed_by_server(&mut client).await);

    wait_until("gauge release", || server.active_connections() == 0).await;
    assert_eq!(server.total_connections(), 1);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_inbound_bytes_are_counted() {
    let server = start_server(test_config(2)).await;

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    client.write_all(&[0xAB; 4096]).await.unwrap();
    drop(client);

    wait_until("admission", || server.total_connections() == 1).await;
    server.pool().wait_idle().await;

    assert_eq!(server.active_connections(), 0);
    assert_eq!(server.stats().roll_window().bytes, 4096);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshots_are_published_each_window() {
    let config = test_config(2).with_stats_interval(Duration::from_millis(100));
    let server = start_server(config).await;
    let mut snapshots = server.subscribe();

    let _client = TcpStream::connect(server.local_addr()).await.unwrap();

    let published = timeout(Duration::from_secs(5), async {
        loop {
            snapshots.changed().await.unwrap();
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.total_connections == 1 && snapshot.active_connections == 1 {
                return snapshot;
            }
        }
    })
    .await
    .unwrap();

    assert!(published.sequence >= 1);
    assert_eq!(server.snapshot().total_connections, 1);

    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_closes_open_connections() {
    let server = start_server(test_config(4)).await;

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    wait_until("admission", || server.total_connections() == 1).await;

    timeout(Duration::from_secs(5), server.shutdown())
        .await
        .unwrap()
        .unwrap();

    assert!(closed_by_server(&mut client).await);
    assert_eq!(server.active_connections(), 0);
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_shutdown_before_start_is_rejected() {
    let server = TcpServer::new(test_config(1)).await.unwrap();
    assert!(matches!(server.shutdown().await, Err(ServiceError::NotRunning)));
    assert!(server.pool().is_shutdown());
}
