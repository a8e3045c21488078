//! HTTP liveness endpoint
//!
//! Answers `GET /check/isWork` with a static page. It never touches the
//! cache; a reply only means the process is up and accepting connections.

use anyhow::Result;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

/// Path of the liveness check
pub const CHECK_PATH: &str = "/check/isWork";

/// Largest request head we are willing to buffer
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Time a client gets to send its request head
const READ_TIMEOUT: Duration = Duration::from_secs(5);

const CHECK_PAGE: &str = "<html>\
    <head></head>\
    <body>\
    <h1>Checking the service.</h1>\
    <p>The service is working!</p>\
    </body>\
    </html>";

/// Status line, content type and body of a reply
#[derive(Debug, PartialEq, Eq)]
struct Response {
    status: &'static str,
    content_type: &'static str,
    body: &'static str,
}

impl Response {
    fn alive() -> Self {
        Self {
            status: "200 OK",
            content_type: "text/html",
            body: CHECK_PAGE,
        }
    }

    fn not_found() -> Self {
        Self {
            status: "404 Not Found",
            content_type: "text/plain",
            body: "Not Found",
        }
    }

    fn bad_request() -> Self {
        Self {
            status: "400 Bad Request",
            content_type: "text/plain",
            body: "Bad Request",
        }
    }

    fn timed_out() -> Self {
        Self {
            status: "408 Request Timeout",
            content_type: "text/plain",
            body: "Request Timeout",
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {}\r\n\
             Content-Type: {}; charset=utf-8\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {}",
            self.status,
            self.content_type,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}

/// Serve liveness checks until the listener fails
pub async fn serve(listener: TcpListener) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(async move {
                    if let Err(e) = respond(stream, READ_TIMEOUT).await {
                        warn!("Liveness request from {} failed: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting liveness connection: {}", e);
            }
        }
    }
}

async fn respond(mut stream: TcpStream, read_timeout: Duration) -> Result<()> {
    let response = match tokio::time::timeout(read_timeout, read_request(&mut stream)).await {
        Ok(result) => match result? {
            Some(response) => response,
            None => return Ok(()),
        },
        Err(_) => Response::timed_out(),
    };

    debug!(status = response.status, "liveness check");
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Read until the end of the request head and pick a reply. `None` when the
/// peer closed without sending anything.
async fn read_request(stream: &mut TcpStream) -> Result<Option<Response>> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(Some(route(&head)));
        }
        if head.len() > MAX_REQUEST_HEAD {
            return Ok(Some(Response::bad_request()));
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if head.is_empty() {
                return Ok(None);
            }
            // Peer half-closed; answer whatever request line we got
            return Ok(Some(route(&head)));
        }
        head.extend_from_slice(&chunk[..n]);
    }
}

fn route(head: &[u8]) -> Response {
    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(head.len());
    let Ok(request_line) = std::str::from_utf8(&head[..line_end]) else {
        return Response::bad_request();
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Response::bad_request();
    };

    let path = target.split('?').next().unwrap_or(target);
    if method == "GET" && path == CHECK_PATH {
        Response::alive()
    } else {
        Response::not_found()
    }
}
