//! Blocking HTTP/1.1 fixtures for driving a real Engine
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// What the fixture does after reading a request
pub enum Reply {
    Respond(Vec<u8>),
    /// Respond after a pause
    Delayed(Duration, Vec<u8>),
    /// Hold the connection open without answering
    Stall(Duration),
}

pub struct TestServer {
    pub addr: SocketAddr,
    /// Raw text of every request received (head and body)
    pub requests: mpsc::Receiver<String>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn next_request(&self) -> String {
        self.requests
            .recv_timeout(Duration::from_secs(5))
            .expect("fixture received no request")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Plain HTTP fixture answering `connections` connections, one request each
pub fn serve<F>(connections: usize, reply: F) -> TestServer
where
    F: Fn(&str) -> Reply + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming().take(connections) {
            let Ok(mut stream) = stream else { continue };
            answer(&mut stream, &tx, &reply);
        }
    });

    TestServer { addr, requests: rx }
}

/// A port nothing listens on
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn response(status: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
    .into_bytes()
}

fn answer<S, F>(stream: &mut S, tx: &mpsc::Sender<String>, reply: &F)
where
    S: Read + Write,
    F: Fn(&str) -> Reply,
{
    let request = read_request(stream);
    let _ = tx.send(request.clone());
    let bytes = match reply(&request) {
        Reply::Respond(bytes) => bytes,
        Reply::Delayed(pause, bytes) => {
            thread::sleep(pause);
            bytes
        }
        Reply::Stall(pause) => {
            thread::sleep(pause);
            return;
        }
    };
    let _ = stream.write_all(&bytes);
    let _ = stream.flush();
}

fn read_request<R: Read>(stream: &mut R) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    let head = String::from_utf8_lossy(&head).into_owned();

    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    if stream.read_exact(&mut body).is_err() {
        body.clear();
    }

    head + &String::from_utf8_lossy(&body)
}

#[cfg(feature = "tls")]
pub mod tls {
    use super::*;
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use rustls::{ServerConfig, ServerConnection, StreamOwned};
    use std::sync::Arc;

    pub struct TlsServer {
        pub server: TestServer,
        /// PEM of the self-signed certificate the fixture presents
        pub cert_pem: String,
    }

    impl TlsServer {
        pub fn url(&self, path: &str) -> String {
            format!("https://localhost:{}{}", self.server.addr.port(), path)
        }
    }

    /// HTTPS fixture with a fresh self-signed certificate for `localhost`
    pub fn serve_tls<F>(connections: usize, reply: F) -> TlsServer
    where
        F: Fn(&str) -> Reply + Send + 'static,
    {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_pem = certified.cert.pem();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

        let config = ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![certified.cert.der().clone()], key)
        .unwrap();
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for stream in listener.incoming().take(connections) {
                let Ok(stream) = stream else { continue };
                let Ok(conn) = ServerConnection::new(config.clone()) else {
                    continue;
                };
                let mut tls = StreamOwned::new(conn, stream);
                answer(&mut tls, &tx, &reply);
                tls.conn.send_close_notify();
                let _ = tls.flush();
            }
        });

        TlsServer {
            server: TestServer { addr, requests: rx },
            cert_pem,
        }
    }
}
