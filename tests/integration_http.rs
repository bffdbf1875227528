#![cfg(feature = "hyper-transport")]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use http::header::{AUTHORIZATION, HeaderValue};
use restsend::prelude::{
    Dispatcher, FailureKind, HyperTransport, InterceptedRequest, JsonReader, JsonWriter,
    ReadyToken, RequestDescriptor, VoidReader,
};
use restsend::{BytesReader, ResponseType};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
struct ResponseSpec {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Duration,
}

impl ResponseSpec {
    fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|window| window == b"\r\n\r\n")
}

fn parse_content_length(raw_headers: &[u8]) -> usize {
    let text = String::from_utf8_lossy(raw_headers);
    for line in text.split("\r\n") {
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
            && let Ok(parsed) = value.trim().parse::<usize>()
        {
            return parsed;
        }
    }
    0
}

fn read_http_message(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;

    let mut raw = Vec::new();
    loop {
        let mut chunk = [0_u8; 1024];
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);

        if let Some(header_end) = find_header_end(&raw) {
            let content_length = parse_content_length(&raw[..header_end]);
            if raw.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    Ok(raw)
}

fn write_http_response(stream: &mut TcpStream, response: &ResponseSpec) -> std::io::Result<()> {
    let mut raw = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        status_text(response.status),
        response.body.len()
    )
    .into_bytes();

    for (name, value) in &response.headers {
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(b"\r\n");
    }
    raw.extend_from_slice(b"\r\n");
    raw.extend_from_slice(&response.body);

    stream.write_all(&raw)?;
    stream.flush()
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Serves `responses` in connection order, one connection each.
    fn start(responses: Vec<ResponseSpec>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let address = listener.local_addr().expect("mock server address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let server_requests = Arc::clone(&requests);
        let server_connections = Arc::clone(&connections);

        let handle = thread::spawn(move || {
            let mut workers = Vec::new();
            for response in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                server_connections.fetch_add(1, Ordering::SeqCst);
                let requests = Arc::clone(&server_requests);
                workers.push(thread::spawn(move || {
                    if let Ok(raw) = read_http_message(&mut stream) {
                        lock_unpoisoned(&requests).push(String::from_utf8_lossy(&raw).into_owned());
                    }
                    thread::sleep(response.delay);
                    let _ = write_http_response(&mut stream, &response);
                }));
            }
            for worker in workers {
                let _ = worker.join();
            }
        });

        Self {
            base_url: format!("http://{address}"),
            requests,
            connections,
            handle: Some(handle),
        }
    }

    fn requests(&self) -> Vec<String> {
        lock_unpoisoned(&self.requests).clone()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn dispatcher(base_url: &str) -> Dispatcher {
    Dispatcher::builder()
        .transport(HyperTransport::new())
        .service_root(base_url)
        .request_interceptor(|request: InterceptedRequest, token: ReadyToken| {
            request.insert_header(AUTHORIZATION, HeaderValue::from_static("Bearer http-test"));
            token.ready();
        })
        .try_build()
        .expect("dispatcher should build")
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Item {
    id: u32,
    name: String,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_decodes_json_and_sends_interceptor_headers_and_parameters() {
    let server = MockServer::start(vec![ResponseSpec::new(
        200,
        r#"[{"id":1,"name":"one"}]"#,
    )]);
    let dispatcher = dispatcher(&server.base_url);

    let items: Vec<Item> = dispatcher
        .send(
            RequestDescriptor::get("/v1/items", JsonReader::new())
                .parameter("page", "2")
                .timeout_millis(2_000),
        )
        .await
        .expect("request should succeed");

    assert_eq!(
        items,
        vec![Item {
            id: 1,
            name: "one".to_owned()
        }]
    );
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /v1/items?page=2 HTTP/1.1\r\n"));
    assert!(
        requests[0]
            .to_ascii_lowercase()
            .contains("authorization: bearer http-test")
    );
    server.join();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_response_times_out_and_is_retried() {
    let server = MockServer::start(vec![
        ResponseSpec::new(200, r#"{"id":1,"name":"late"}"#).delayed(Duration::from_millis(600)),
        ResponseSpec::new(200, r#"{"id":2,"name":"fast"}"#),
    ]);
    let dispatcher = dispatcher(&server.base_url);

    let item: Item = dispatcher
        .send(
            RequestDescriptor::get("/v1/items/1", JsonReader::new())
                .timeout_millis(150)
                .max_retries(1),
        )
        .await
        .expect("retry should succeed");

    assert_eq!(item.id, 2);
    assert_eq!(server.connections(), 2);
    server.join();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_response_without_retry_budget_reports_timeout() {
    let server = MockServer::start(vec![
        ResponseSpec::new(200, "{}").delayed(Duration::from_millis(500)),
    ]);
    let dispatcher = dispatcher(&server.base_url);

    let failure = dispatcher
        .send(RequestDescriptor::get("/v1/slow", VoidReader).timeout_millis(100))
        .await
        .expect_err("request should time out");

    assert_eq!(failure.kind(), FailureKind::Timeout);
    assert_eq!(server.connections(), 1);
    server.join();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn post_sends_json_body_and_routes_error_status() {
    let server = MockServer::start(vec![ResponseSpec::new(
        503,
        r#"{"error":"maintenance"}"#,
    )]);
    let dispatcher = dispatcher(&server.base_url);

    let failure = dispatcher
        .send(
            RequestDescriptor::post("/v1/items", JsonReader::<Item>::new())
                .body(
                    Item {
                        id: 9,
                        name: "nine".to_owned(),
                    },
                    JsonWriter::new(),
                )
                .max_retries(3),
        )
        .await
        .expect_err("503 is not a success code");

    assert_eq!(failure.kind(), FailureKind::HttpStatus);
    assert_eq!(failure.status().map(|status| status.as_u16()), Some(503));
    assert_eq!(failure.status_text(), Some("Service Unavailable"));
    assert_eq!(failure.body(), Some(r#"{"error":"maintenance"}"#));
    assert_eq!(failure.headers()["content-type"], "application/json");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("POST /v1/items HTTP/1.1\r\n"));
    assert!(
        requests[0]
            .to_ascii_lowercase()
            .contains("content-type: application/json")
    );
    assert!(requests[0].ends_with(r#"{"id":9,"name":"nine"}"#));
    server.join();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refused_connection_is_a_terminal_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("address");
    drop(listener);
    let dispatcher = dispatcher(&format!("http://{address}"));

    let failure = dispatcher
        .send(
            RequestDescriptor::get("/v1/items", VoidReader)
                .timeout_millis(1_000)
                .max_retries(3),
        )
        .await
        .expect_err("nothing is listening");

    assert_eq!(failure.kind(), FailureKind::Transport);
    assert_eq!(failure.status(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn binary_body_arrives_byte_for_byte() {
    let payload = vec![0x89, b'P', b'N', b'G', 0x00, 0xff, 0xfe, 0x0a];
    let mut response = ResponseSpec::new(200, payload.clone());
    response.headers = vec![(
        "Content-Type".to_owned(),
        "application/octet-stream".to_owned(),
    )];
    let server = MockServer::start(vec![response]);
    let dispatcher = dispatcher(&server.base_url);

    let body = dispatcher
        .send(
            RequestDescriptor::get("/v1/logo.png", BytesReader)
                .response_type(ResponseType::Binary)
                .timeout_millis(2_000),
        )
        .await
        .expect("binary download should succeed");

    assert_eq!(body.as_ref(), payload.as_slice());
    server.join();
}

#[cfg(feature = "rustls-tls")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn default_transport_starts_a_tls_handshake_for_https_urls() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("address");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("client should connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        let mut first = [0_u8; 1];
        stream.read_exact(&mut first).map(|()| first[0])
    });

    let dispatcher = Dispatcher::builder()
        .service_root(format!("https://{address}"))
        .try_build()
        .expect("default transport should build");
    let failure = dispatcher
        .send(RequestDescriptor::get("/v1/items", VoidReader).timeout_millis(2_000))
        .await
        .expect_err("the server does not speak TLS");

    // 0x16 opens a TLS handshake record, i.e. a ClientHello.
    let first_byte = handle
        .join()
        .expect("server thread")
        .expect("client should send bytes");
    assert_eq!(first_byte, 0x16);
    assert_eq!(failure.kind(), FailureKind::Transport);
}
