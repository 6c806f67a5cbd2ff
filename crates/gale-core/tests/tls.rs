#![cfg(feature = "tls")]

mod support;

use gale_core::{
    Engine, EngineConfig, ExchangeState, Method, RequestBuilder, SessionFactory, TlsOptions,
    Verification,
};
use std::io::Write;
use std::time::Duration;
use support::tls::serve_tls;
use support::{response, Reply};

fn trust_file(pem: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(pem.as_bytes()).unwrap();
    file
}

fn config() -> EngineConfig {
    support::init_tracing();
    EngineConfig::new().connect_timeout(Some(Duration::from_secs(5)))
}

#[test]
fn test_https_with_trust_file() {
    let server = serve_tls(1, |_| Reply::Respond(response("200 OK", "secure hello")));
    let ca = trust_file(&server.cert_pem);
    let engine = Engine::with_config(config().tls(TlsOptions::new().trust_file(ca.path()))).unwrap();

    let request = RequestBuilder::new(Method::Get, &server.url("/")).build();
    let response = engine.send(&request).unwrap();
    response.wait();

    assert!(response.is_success(), "error: {}", response.error());
    assert_eq!(response.text(), Some("secure hello"));
    assert!(response.error().is_empty());

    let received = server.server.next_request().to_ascii_lowercase();
    let expected = format!("\r\nhost: localhost:{}\r\n", server.server.addr.port());
    assert!(received.contains(&expected));
}

#[test]
fn test_https_rejects_untrusted_certificate() {
    let server = serve_tls(1, |_| Reply::Respond(response("200 OK", "unreachable")));
    let factory = SessionFactory::new(TlsOptions::default()).unwrap();
    let engine = Engine::with_config(config()).unwrap();

    let request = RequestBuilder::new(Method::Get, &server.url("/")).build();
    let response = engine.send_with(&request, &factory).unwrap();
    response.wait();

    assert!(!response.is_success());
    assert_eq!(response.state(), ExchangeState::Failed);
    assert!(response.error().starts_with("[Socket error: tls handshake"));
    assert!(!response.error().contains("No additional TLS errors"));
    // Reading the error drained the queue
    assert_eq!(factory.last_error_string(), "No additional TLS errors");
}

#[test]
fn test_https_accept_all_opt_in() {
    let server = serve_tls(1, |_| Reply::Respond(response("200 OK", "trusting")));
    let options = TlsOptions::new().verification(Verification::AcceptAll);
    let factory = SessionFactory::new(options).unwrap();
    let engine = Engine::with_config(config()).unwrap();

    let request = RequestBuilder::new(Method::Get, &server.url("/")).build();
    let response = engine.send_with(&request, &factory).unwrap();
    response.wait();

    assert!(response.is_success(), "error: {}", response.error());
    assert_eq!(response.text(), Some("trusting"));
}

#[test]
fn test_https_not_found_over_tls() {
    let server = serve_tls(1, |_| Reply::Respond(response("404 Not Found", "gone")));
    let ca = trust_file(&server.cert_pem);
    let factory = SessionFactory::new(TlsOptions::new().trust_file(ca.path())).unwrap();
    let engine = Engine::with_config(config()).unwrap();

    let request = RequestBuilder::new(Method::Get, &server.url("/gone")).build();
    let response = engine.send_with(&request, &factory).unwrap();
    response.wait();

    assert_eq!(response.status_code(), 404);
    assert_eq!(response.text(), Some("gone"));
    assert_eq!(
        response.error(),
        "[Socket error: No socket errors]; [TLS error: No additional TLS errors]"
    );
}

#[test]
fn test_bad_trust_file_fails_construction() {
    let file = trust_file("not a certificate\n");
    let config = config().tls(TlsOptions::new().trust_file(file.path()));
    assert!(matches!(Engine::with_config(config), Err(gale_core::Error::Tls(_))));
}

#[test]
fn test_plain_request_through_factory() {
    let server = support::serve(1, |_| Reply::Respond(response("200 OK", "plain")));
    let factory = SessionFactory::new(TlsOptions::default()).unwrap();
    let engine = Engine::with_config(config()).unwrap();

    let request = RequestBuilder::new(Method::Get, &server.url("/")).build();
    let response = engine.send_with(&request, &factory).unwrap();
    response.wait();
    assert_eq!(response.text(), Some("plain"));
}
