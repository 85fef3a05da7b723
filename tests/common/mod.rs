#![allow(dead_code)]

pub mod test_server {
    use rpcrouter::config::{ClientConfig, ServerConfig};
    use rpcrouter::rpc::RpcServer;
    use rpcrouter::server::ServerHandle;
    use std::net::{SocketAddr, TcpListener};
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// Reserve a free local port
    pub fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// An `RpcServer` listening on a random local port
    ///
    /// Stops the server when dropped, even if the test panicked.
    pub struct RpcTestServer {
        handle: Option<ServerHandle>,
        addr: SocketAddr,
        path: String,
    }

    impl RpcTestServer {
        pub fn start(server: &RpcServer) -> Self {
            Self::start_with(server, ServerConfig::default())
        }

        pub fn start_with(server: &RpcServer, mut config: ServerConfig) -> Self {
            setup_may_runtime();
            config.host = "127.0.0.1".into();
            config.port = free_port();
            let handle = server.start(&config).unwrap();
            handle.wait_ready().unwrap();
            let path = match &config.root {
                Some(root) => format!("{}{}", root.trim_end_matches('/'), server.path()),
                None => server.path().to_owned(),
            };
            Self {
                addr: handle.addr(),
                handle: Some(handle),
                path,
            }
        }

        pub fn addr(&self) -> SocketAddr {
            self.addr
        }

        /// Client configuration pointing at this server
        pub fn client_config(&self) -> ClientConfig {
            let mut config = ClientConfig::new("127.0.0.1", self.addr.port());
            config.path.clone_from(&self.path);
            config.timeout_secs = 5;
            config
        }
    }

    impl Drop for RpcTestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw HTTP/1.1 request and return the full response text
    pub fn send_request(addr: SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if response_complete(&buf) {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn response_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        body.len() >= length
    }

    /// A `POST` with an XML body
    pub fn post_xml(addr: SocketAddr, path: &str, body: &str) -> String {
        let req = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        send_request(addr, &req)
    }

    /// `(status, content type, body)` of a raw response
    pub fn parse_response_parts(resp: &str) -> (u16, String, String) {
        let mut parts = resp.splitn(2, "\r\n\r\n");
        let headers = parts.next().unwrap_or("");
        let body = parts.next().unwrap_or("").to_string();
        let mut status = 0;
        let mut content_type = String::new();
        for line in headers.lines() {
            if line.starts_with("HTTP/1.1") {
                status = line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("0")
                    .parse()
                    .unwrap();
            } else if let Some((name, val)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-type") {
                    content_type = val.trim().to_string();
                }
            }
        }
        (status, content_type, body)
    }
}
