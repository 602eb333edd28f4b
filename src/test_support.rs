//! Minimal HTTP/1.1 server for exercising the fetcher against real sockets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub enum Mode {
    /// Honours `Range: bytes=N-` with 206/416.
    Ranged,
    /// Always answers 200 with the whole body.
    IgnoreRange,
    /// Answers with the given status and a short text body.
    Status(u16),
    /// Announces the full remaining length but closes after this many bytes.
    CutAfter(usize),
    /// Sends the whole body without a Content-Length and ends it by closing.
    NoLength,
}

#[derive(Clone, Debug)]
pub struct Route {
    pub body: Vec<u8>,
    pub mode: Mode,
    pub content_type: &'static str,
}

impl Route {
    pub fn bytes(body: Vec<u8>, mode: Mode) -> Self {
        Self {
            body,
            mode,
            content_type: "application/octet-stream",
        }
    }

    pub fn json(body: &str) -> Self {
        Self {
            body: body.as_bytes().to_vec(),
            mode: Mode::Ranged,
            content_type: "application/json",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub target: String,
    pub range: Option<String>,
}

pub struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes.into_iter().map(|(path, route)| (path.to_string(), route)).collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, &routes, &recorded).await;
                });
            }
        });

        Self {
            url: format!("http://127.0.0.1:{port}"),
            requests,
            handle,
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Client that never routes loopback traffic through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Deterministic, non-repeating-per-chunk payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn serve(
    mut stream: TcpStream,
    routes: &HashMap<String, Route>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }
    let head = String::from_utf8_lossy(&head).to_string();
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let range = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim().eq_ignore_ascii_case("range").then(|| value.trim().to_string())
    });
    recorded.lock().unwrap().push(RecordedRequest {
        target: target.clone(),
        range: range.clone(),
    });

    let path = target.split('?').next().unwrap_or("/");
    let text = [("Content-Type", "text/plain".to_string())];
    let Some(route) = routes.get(path) else {
        return respond(&mut stream, 404, &text, b"no such route").await;
    };

    let len = route.body.len();
    let start = range
        .as_deref()
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.strip_suffix('-'))
        .and_then(|r| r.parse::<usize>().ok());

    match (&route.mode, start) {
        (Mode::Status(code), _) => respond(&mut stream, *code, &text, b"mock error").await,
        (Mode::Ranged, Some(start)) if start >= len => {
            respond(&mut stream, 416, &[("Content-Range", format!("bytes */{len}"))], b"").await
        }
        (Mode::Ranged, Some(start)) => {
            let headers = [
                ("Content-Type", route.content_type.to_string()),
                ("Content-Range", format!("bytes {}-{}/{}", start, len - 1, len)),
            ];
            respond(&mut stream, 206, &headers, &route.body[start..]).await
        }
        (Mode::CutAfter(n), start) => {
            let start = start.unwrap_or(0).min(len);
            let remaining = &route.body[start..];
            let status = if start > 0 { 206 } else { 200 };
            let head = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\n\
                 Connection: close\r\n\r\n",
                route.content_type,
                remaining.len()
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(&remaining[..(*n).min(remaining.len())]).await?;
            stream.flush().await?;
            stream.shutdown().await
        }
        (Mode::NoLength, _) => {
            let head = format!(
                "HTTP/1.1 200 Mock\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
                route.content_type
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(&route.body).await?;
            stream.flush().await?;
            stream.shutdown().await
        }
        _ => {
            let headers = [("Content-Type", route.content_type.to_string())];
            respond(&mut stream, 200, &headers, &route.body).await
        }
    }
}

async fn respond(
    stream: &mut TcpStream,
    status: u16,
    headers: &[(&str, String)],
    body: &[u8],
) -> std::io::Result<()> {
    let mut head = format!("HTTP/1.1 {status} Mock\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("Content-Length: {}\r\nConnection: close\r\n\r\n", body.len()));
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    stream.shutdown().await
}
