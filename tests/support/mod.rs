//! Test support for starting/stopping throwaway Redis servers.

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use convoy::{Config, Convoy};

/// Owns a `redis-server` process started on a free port for one test, and
/// kills it again when dropped. Every test gets its own empty database this
/// way, so tests can run in parallel without seeing each other's keys.
pub struct TestContext {
    server: Child,
    port: u16,
}

impl TestContext {
    pub fn new() -> Self {
        let port = free_port();
        let server = Command::new("redis-server")
            .arg("--port")
            .arg(port.to_string())
            .arg("--save")
            .arg("")
            .arg("--appendonly")
            .arg("no")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start redis-server, is it installed?");
        let ctx = TestContext { server, port };
        ctx.wait_until_ready();
        ctx
    }

    /// Default configuration pointed at this test's Redis server.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.redis.url = format!("redis://127.0.0.1:{}", self.port);
        config
    }

    pub fn convoy(&self) -> Convoy {
        Convoy::new(self.config())
    }

    /// Raw async connection for asserting on Redis state directly.
    pub async fn connection(&self) -> redis::aio::MultiplexedConnection {
        let client = redis::Client::open(self.config().redis_url().as_str()).unwrap();
        client.get_multiplexed_tokio_connection().await.unwrap()
    }

    fn wait_until_ready(&self) {
        let client = redis::Client::open(self.config().redis_url().as_str()).unwrap();
        for _ in 0..100 {
            if let Ok(mut conn) = client.get_connection() {
                if redis::cmd("PING").query::<String>(&mut conn).is_ok() {
                    return;
                }
            }
            thread::sleep(Duration::from_millis(50));
        }
        panic!("redis-server did not become ready on port {}", self.port);
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = self.server.kill();
        let _ = self.server.wait();
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind a free port");
    listener.local_addr().unwrap().port()
}
