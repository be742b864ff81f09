use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use url::Url;

/// What the stub answers for one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl Reply {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
        }
    }

    pub fn image(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "image/jpeg",
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: format!("status {status}").into_bytes(),
        }
    }
}

/// Tiny HTTP server on an ephemeral port that routes every request through
/// `handler` and counts hits.
pub struct StubServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl StubServer {
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&Url) -> Reply + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");
        let hits = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_hits = Arc::clone(&hits);
        let thread_base = base_url.clone();
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };
                thread_hits.fetch_add(1, Ordering::SeqCst);

                let reply = match Url::parse(&format!("{thread_base}{}", request.url())) {
                    Ok(url) => handler(&url),
                    Err(_) => Reply::status(400),
                };
                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    reply.content_type.as_bytes(),
                )
                .expect("build header");
                let response = tiny_http::Response::from_data(reply.body)
                    .with_status_code(reply.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// First value of query parameter `name`.
#[allow(dead_code)]
pub fn query(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
