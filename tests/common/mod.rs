#![allow(dead_code)]

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    /// One worker thread, so tasks interleave only at suspension points.
    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(1).set_stack_size(0x8000);
        });
    }
}

pub mod wait {
    use std::thread;
    use std::time::{Duration, Instant};

    /// Poll `cond` every millisecond until it holds or `timeout` elapses.
    pub fn until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }
}

pub mod http {
    use serde_json::Value;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Status, lowercase headers and body of one HTTP response.
    #[derive(Debug)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn json(&self) -> Value {
            serde_json::from_str(&self.body).unwrap_or_else(|e| {
                panic!("body is not JSON ({e}): {:?}", self.body);
            })
        }
    }

    /// Send one request on a fresh connection and read exactly one response,
    /// using `Content-Length` to find the end of the body.
    pub fn send_request(
        addr: SocketAddr,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> RawResponse {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let mut req = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n");
        if let Some(body) = body {
            req.push_str("Content-Type: application/json\r\n");
            req.push_str(&format!("Content-Length: {}\r\n", body.len()));
            req.push_str("\r\n");
            req.push_str(body);
        } else {
            req.push_str("\r\n");
        }
        stream.write_all(req.as_bytes()).unwrap();

        let mut reader = BufReader::new(stream);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).unwrap();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .unwrap_or("0")
            .parse()
            .unwrap();

        let mut headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim().to_string();
                if name == "content-length" {
                    content_length = value.parse().unwrap();
                }
                headers.push((name, value));
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();
        RawResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        }
    }
}

pub mod fixture {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use tasklane::backend::Row;
    use tasklane::cli::build_app;
    use tasklane::handlers::AppState;
    use tasklane::runtime_config::RuntimeConfig;
    use tasklane::server::{AppService, HttpServer, ServerHandle};

    use super::test_server::setup_may_runtime;

    /// `/things` server on a random port over an in-memory database.
    ///
    /// Stops the server on drop.
    pub struct ThingsServer {
        handle: Option<ServerHandle>,
        pub state: AppState,
    }

    impl ThingsServer {
        pub fn new() -> Self {
            setup_may_runtime();
            let (state, router) = build_app(":memory:", &RuntimeConfig::default()).unwrap();
            let service = AppService::new(Arc::new(router), state.scheduler.clone());
            let handle = HttpServer(service).start("127.0.0.1:0").unwrap();
            handle.wait_ready(Duration::from_secs(1)).unwrap();
            Self {
                handle: Some(handle),
                state,
            }
        }

        /// Server with the given names inserted in order (ids 1..=n).
        pub fn with_things(names: &[&str]) -> Self {
            let server = Self::new();
            for name in names {
                server
                    .state
                    .backend
                    .execute("INSERT INTO things (name) VALUES (?1)", vec![(*name).into()])
                    .unwrap();
            }
            server
        }

        pub fn addr(&self) -> SocketAddr {
            self.handle.as_ref().unwrap().addr()
        }

        pub fn rows(&self) -> Vec<Row> {
            self.state
                .backend
                .execute("SELECT id, name FROM things ORDER BY id", Vec::new())
                .unwrap()
        }
    }

    impl Drop for ThingsServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }
}
