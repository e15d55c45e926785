//! Minimal HTTP/1.1 server answering canned responses, for client tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the server answers one path.
#[derive(Clone)]
pub(crate) enum Route {
    Respond { status: u16, body: Vec<u8> },
    /// Accept the request and never answer.
    Stall,
}

impl Route {
    pub(crate) fn ok(body: impl Into<Vec<u8>>) -> Self {
        Route::Respond {
            status: 200,
            body: body.into(),
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Route::Respond {
            status,
            body: Vec::new(),
        }
    }
}

/// A running server. Unknown paths get a 404.
pub(crate) struct CannedServer {
    pub(crate) base_url: String,
    requested: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    pub(crate) async fn start(routes: &[(&str, Route)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .iter()
                .map(|(path, route)| (path.to_string(), route.clone()))
                .collect(),
        );
        let requested = Arc::new(Mutex::new(Vec::new()));

        let seen = requested.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer(stream, routes.clone(), seen.clone()));
            }
        });

        CannedServer {
            base_url,
            requested,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Request paths received so far, in arrival order.
    pub(crate) fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

async fn answer(
    mut stream: TcpStream,
    routes: Arc<HashMap<String, Route>>,
    seen: Arc<Mutex<Vec<String>>>,
) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    seen.lock().unwrap().push(path.clone());

    let (status, body) = match routes.get(&path).cloned() {
        Some(Route::Respond { status, body }) => (status, body),
        Some(Route::Stall) => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return;
        }
        None => (404, b"{\"error\":\"Not found\"}".to_vec()),
    };

    let header = format!(
        "HTTP/1.1 {status} Canned\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes()).await;
    let _ = stream.write_all(&body).await;
    let _ = stream.shutdown().await;
}
