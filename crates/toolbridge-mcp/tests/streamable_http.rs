//! Protocol client over streamable HTTP against a local test server.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use toolbridge_core::{ConnectionState, NoopEmitter, ServerConfig};
use toolbridge_mcp::jsonrpc::JsonRpcMessage;
use toolbridge_mcp::transport::StreamableHttpTransport;
use toolbridge_mcp::{DefaultTransportFactory, ProtocolClient, Transport};

struct Request {
    method: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

#[derive(Default)]
struct ServerState {
    sessions_issued: AtomicUsize,
    current_session: Mutex<String>,
    /// `(rpc method, session header)` for every POST.
    posts: Mutex<Vec<(String, Option<String>)>>,
    deletes: AtomicUsize,
    /// DELETE requests are accepted but never answered.
    hang_on_delete: AtomicBool,
    authorization: Mutex<Option<String>>,
}

impl ServerState {
    fn expire_sessions(&self) {
        *self.current_session.lock().unwrap() = "expired".to_string();
    }

    fn posts(&self) -> Vec<(String, Option<String>)> {
        self.posts.lock().unwrap().clone()
    }
}

async fn spawn_server() -> (String, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/mcp", listener.local_addr().unwrap());
    let state = Arc::new(ServerState::default());

    let shared = Arc::clone(&state);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = Arc::clone(&shared);
            tokio::spawn(async move { serve_connection(stream, state).await });
        }
    });
    (url, state)
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find_header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]).into_owned();
            let mut lines = head.lines();
            let method = lines.next()?.split_whitespace().next()?.to_string();
            let headers: HashMap<String, String> = lines
                .filter_map(|l| l.split_once(':'))
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                .collect();
            let length: usize = headers
                .get("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            while buf.len() < end + 4 + length {
                let n = stream.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(Request {
                method,
                headers,
                body: buf[end + 4..end + 4 + length].to_vec(),
            });
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn respond(stream: &mut TcpStream, status: &str, content_type: &str, extra: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n{extra}\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn serve_connection(mut stream: TcpStream, state: Arc<ServerState>) {
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    if request.method == "DELETE" {
        state.deletes.fetch_add(1, Ordering::SeqCst);
        if state.hang_on_delete.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        respond(&mut stream, "200 OK", "text/plain", "", "").await;
        return;
    }

    let message: Value = serde_json::from_slice(&request.body).unwrap_or_default();
    let rpc_method = message["method"].as_str().unwrap_or_default().to_string();
    let session = request.headers.get("mcp-session-id").cloned();
    state
        .posts
        .lock()
        .unwrap()
        .push((rpc_method.clone(), session.clone()));
    if let Some(auth) = request.headers.get("authorization") {
        *state.authorization.lock().unwrap() = Some(auth.clone());
    }

    if message.get("id").is_none() {
        respond(&mut stream, "202 Accepted", "text/plain", "", "").await;
        return;
    }
    let id = message["id"].clone();

    if rpc_method == "initialize" {
        let n = state.sessions_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let issued = format!("s{n}");
        *state.current_session.lock().unwrap() = issued.clone();
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "serverInfo": {"name": "remote"},
                "capabilities": {"tools": {}}
            }
        });
        let extra = format!("mcp-session-id: {issued}\r\n");
        respond(&mut stream, "200 OK", "application/json", &extra, &body.to_string()).await;
        return;
    }

    let current = state.current_session.lock().unwrap().clone();
    if session.as_deref() != Some(current.as_str()) {
        respond(&mut stream, "404 Not Found", "text/plain", "", "Session not found").await;
        return;
    }

    match rpc_method.as_str() {
        "tools/list" => {
            let body = json!({"jsonrpc": "2.0", "id": id, "result": {"tools": [{"name": "search"}]}});
            respond(&mut stream, "200 OK", "application/json", "", &body.to_string()).await;
        }
        "tools/call" => {
            let body = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": "found"}]}
            });
            let event = format!("event: message\ndata: {body}\n\n");
            respond(&mut stream, "200 OK", "text/event-stream", "", &event).await;
        }
        other => {
            let body = json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {other}")}
            });
            respond(&mut stream, "200 OK", "application/json", "", &body.to_string()).await;
        }
    }
}

fn client_for(config: ServerConfig) -> ProtocolClient {
    ProtocolClient::new(
        config,
        Arc::new(DefaultTransportFactory::default()),
        Arc::new(NoopEmitter),
    )
}

#[tokio::test]
async fn session_id_is_captured_and_replayed() {
    let (url, state) = spawn_server().await;
    let client = client_for(ServerConfig::streamable_http("remote", &url).with_bearer_token("tok"));

    client.connect().await.unwrap();
    let tools = client.list_tools().await.unwrap();

    assert_eq!(tools[0].name, "search");
    let posts = state.posts();
    assert_eq!(posts[0], ("initialize".to_string(), None));
    assert!(posts[1..].iter().all(|(_, s)| s.as_deref() == Some("s1")));
    assert_eq!(
        state.authorization.lock().unwrap().as_deref(),
        Some("Bearer tok")
    );
}

#[tokio::test]
async fn event_stream_replies_are_delivered() {
    let (url, _state) = spawn_server().await;
    let client = client_for(ServerConfig::streamable_http("remote", &url));

    let result = client.call_tool("search", json!({"q": "rust"})).await.unwrap();

    assert_eq!(result.content[0]["text"], "found");
}

#[tokio::test]
async fn method_not_found_caches_empty() {
    let (url, state) = spawn_server().await;
    let client = client_for(ServerConfig::streamable_http("remote", &url));

    assert!(client.list_resources().await.unwrap().is_empty());
    assert!(client.list_resources().await.unwrap().is_empty());

    let hits = state
        .posts()
        .iter()
        .filter(|(m, _)| m == "resources/list")
        .count();
    assert_eq!(hits, 1);
}

#[tokio::test]
async fn expired_session_rebuilds_transport() {
    let (url, state) = spawn_server().await;
    let client = client_for(ServerConfig::streamable_http("remote", &url));
    client.connect().await.unwrap();

    state.expire_sessions();
    let result = client.call_tool("search", json!({})).await.unwrap();

    assert_eq!(result.content[0]["text"], "found");
    assert_eq!(state.sessions_issued.load(Ordering::SeqCst), 2);
    assert_eq!(client.state().await, ConnectionState::Connected);
    // The old session was terminated
    assert!(state.deletes.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn disconnect_terminates_session() {
    let (url, state) = spawn_server().await;
    let client = client_for(ServerConfig::streamable_http("remote", &url));
    client.connect().await.unwrap();

    client.disconnect().await;

    assert_eq!(state.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(client.state().await, ConnectionState::Stopped);
}

#[tokio::test]
async fn close_gives_up_on_unresponsive_session_termination() {
    let (url, state) = spawn_server().await;
    state.hang_on_delete.store(true, Ordering::SeqCst);
    let transport = StreamableHttpTransport::new(&url, &Default::default(), None)
        .unwrap()
        .with_close_timeout(Duration::from_millis(200));

    transport
        .send(JsonRpcMessage::request(1, "initialize", Some(json!({}))))
        .await
        .unwrap();
    assert!(transport.receive().await.is_some());
    assert_eq!(transport.session_id().await.as_deref(), Some("s1"));

    tokio::time::timeout(Duration::from_secs(5), transport.close())
        .await
        .expect("close should not wait for the server");

    assert_eq!(state.deletes.load(Ordering::SeqCst), 1);
    assert!(transport.receive().await.is_none());
}
