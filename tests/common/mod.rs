#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use maildog::{MailTransport, SendError, SendMail, SendOutcome};

/// Transport that records every send and can be told to fail.
pub struct MockTransport {
    pub sent: Mutex<Vec<SendMail>>,
    pub fail: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let transport = Self::new();
        transport.fail.store(true, Ordering::SeqCst);
        transport
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, mail: SendMail) -> Result<SendOutcome, SendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Transport {
                transport: "mock".to_string(),
                message: "mock transport told to fail".to_string(),
            });
        }

        self.sent.lock().await.push(mail);
        Ok(SendOutcome {
            provider: "mock".to_string(),
            provider_msg_id: Some("mock-1".to_string()),
        })
    }
}

/// One HTTP request captured by a [`TestServer`].
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Minimal HTTP server capturing POSTed webhook requests.
pub struct TestServer {
    pub url: String,
    pub received: Arc<Mutex<Vec<ReceivedRequest>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server answering every request with the given status.
    pub async fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let sink = sink.clone();
                tokio::spawn(async move {
                    if let Some(request) = read_request(&mut socket).await {
                        sink.lock().await.push(request);
                    }
                    let response = format!(
                        "HTTP/1.1 {status} STATUS\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/hook"),
            received,
            handle,
        }
    }

    pub async fn request_count(&self) -> usize {
        self.received.lock().await.len()
    }

    /// Wait until the server captured `count` requests, panicking on timeout.
    pub async fn wait_for_requests(&self, count: usize) -> Vec<ReceivedRequest> {
        wait_until(Duration::from_secs(3), || async {
            self.received.lock().await.len() >= count
        })
        .await;
        self.received.lock().await.clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<ReceivedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut headers = Vec::new();
    for line in head.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Some(ReceivedRequest { headers, body })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Poll a condition until it holds or the deadline passes.
pub async fn wait_until<F, Fut>(deadline: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(deadline, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met before deadline");
}
