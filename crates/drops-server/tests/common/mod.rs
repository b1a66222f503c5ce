#![allow(dead_code)]

use drops_core::ManualClock;
use drops_server::config::Config;
use drops_server::{run_with_shutdown, ServerState};
use drops_transport::TcpTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.metrics.enabled = false;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    pub shutdown: watch::Sender<bool>,
}

pub async fn start_server() -> TestServer {
    start_server_with(test_config()).await
}

pub async fn start_server_with(config: Config) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::with_clock(config, Arc::new(ManualClock::new(0))));
    let (shutdown, shutdown_rx) = watch::channel(false);

    tokio::spawn(run_with_shutdown(
        TcpTransport::from_listener(listener),
        Arc::clone(&state),
        shutdown_rx,
    ));

    TestServer {
        addr,
        state,
        shutdown,
    }
}

impl TestServer {
    /// Wait until `name` is no longer registered.
    pub async fn wait_unregistered(&self, name: &str) {
        for _ in 0..200 {
            if !self.state.registry().contains(name) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("station {name} still registered");
    }
}

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: &SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn recv(&mut self) -> String {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        assert!(read > 0, "connection closed");
        line.trim_end_matches('\n').to_string()
    }

    /// Send one command and return its reply.
    pub async fn call(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv().await
    }

    /// Returns `true` if nothing arrives within `wait`.
    pub async fn is_silent(&mut self, wait: Duration) -> bool {
        let mut line = String::new();
        tokio::time::timeout(wait, self.reader.read_line(&mut line))
            .await
            .is_err()
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for close");
        assert!(matches!(read, Ok(0) | Err(_)), "unexpected line {line:?}");
    }
}
