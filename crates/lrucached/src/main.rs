//! LRU cache daemon - Redis-compatible RESP server with an HTTP liveness check

mod handler;
mod health;
mod resp;

use anyhow::{bail, Result};
use bytes::BytesMut;
use clap::Parser;
use lrucache::LruCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::handler::{CommandHandler, SharedCache};
use crate::resp::Frame;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RESP bind address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    bind: String,

    /// HTTP liveness bind address
    #[arg(long, default_value = "127.0.0.1:8080")]
    http_bind: String,

    /// Cache capacity (number of entries)
    #[arg(short, long, default_value_t = 10000)]
    capacity: usize,

    /// Health check mode (for Docker)
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.health {
        match check_server(&args.bind).await {
            Ok(()) => {
                println!("OK");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    info!("Starting lrucached v{}", env!("CARGO_PKG_VERSION"));
    info!("Cache capacity: {}", args.capacity);

    let cache: SharedCache = Arc::new(LruCache::new(args.capacity)?);

    let listener = TcpListener::bind(&args.bind).await?;
    info!("RESP server listening on {}", args.bind);

    let http_listener = TcpListener::bind(&args.http_bind).await?;
    info!(
        "Liveness check at http://{}{}",
        args.http_bind,
        health::CHECK_PATH
    );
    tokio::spawn(async move {
        if let Err(e) = health::serve(http_listener).await {
            error!("Liveness endpoint stopped: {}", e);
        }
    });

    tokio::select! {
        _ = accept_loop(listener, cache) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn accept_loop(listener: TcpListener, cache: SharedCache) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let cache = Arc::clone(&cache);

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, cache).await {
                        error!("Error handling client {}: {}", addr, e);
                    }
                    info!("Connection closed: {}", addr);
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(mut stream: TcpStream, cache: SharedCache) -> Result<()> {
    let handler = CommandHandler::new(cache);
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        let n = stream.read_buf(&mut buffer).await?;

        if n == 0 {
            // Connection closed
            return Ok(());
        }

        // Answer every complete frame in the buffer, in order
        loop {
            match Frame::decode(&mut buffer) {
                Ok(Some(cmd)) => {
                    let response = handler.handle(cmd);
                    stream.write_all(&response.encode()).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Parse error: {}", e);
                    stream.write_all(&Frame::err(&e).encode()).await?;
                    buffer.clear();
                    break;
                }
            }
        }
    }
}

/// Send `PING` to a running server and expect `+PONG`
async fn check_server(addr: &str) -> Result<()> {
    match tokio::time::timeout(Duration::from_secs(2), ping(addr)).await?? {
        Frame::Simple(s) if s == "PONG" => Ok(()),
        other => bail!("unexpected reply {:?}", other),
    }
}

async fn ping(addr: &str) -> Result<Frame> {
    let mut stream = TcpStream::connect(addr).await?;
    let cmd = Frame::Array(Some(vec![Frame::Bulk(Some(b"PING".to_vec()))]));
    stream.write_all(&cmd.encode()).await?;

    let mut buffer = BytesMut::with_capacity(64);
    loop {
        if stream.read_buf(&mut buffer).await? == 0 {
            bail!("connection closed before reply");
        }
        if let Some(reply) = Frame::decode(&mut buffer)? {
            return Ok(reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start_server(capacity: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let cache: SharedCache = Arc::new(LruCache::new(capacity).unwrap());
        tokio::spawn(accept_loop(listener, cache));
        addr
    }

    fn cmd(parts: &[&str]) -> Vec<u8> {
        Frame::Array(Some(
            parts
                .iter()
                .map(|p| Frame::Bulk(Some(p.as_bytes().to_vec())))
                .collect(),
        ))
        .encode()
    }

    async fn read_frames(stream: &mut TcpStream, count: usize) -> Vec<Frame> {
        let mut buffer = BytesMut::new();
        let mut frames = Vec::new();
        while frames.len() < count {
            while let Some(frame) = Frame::decode(&mut buffer).unwrap() {
                frames.push(frame);
            }
            if frames.len() < count {
                assert!(stream.read_buf(&mut buffer).await.unwrap() > 0);
            }
        }
        frames
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let addr = start_server(2).await;
        let mut stream = TcpStream::connect(&addr).await.unwrap();

        let mut batch = Vec::new();
        batch.extend(cmd(&["SET", "1", "a"]));
        batch.extend(cmd(&["SET", "2", "b"]));
        batch.extend(cmd(&["GET", "1"]));
        batch.extend(cmd(&["SET", "3", "c"]));
        batch.extend(cmd(&["GET", "2"]));
        batch.extend(cmd(&["DBSIZE"]));
        stream.write_all(&batch).await.unwrap();

        let frames = read_frames(&mut stream, 6).await;
        assert_eq!(
            frames,
            vec![
                Frame::ok(),
                Frame::ok(),
                Frame::Bulk(Some(b"a".to_vec())),
                Frame::ok(),
                Frame::null(),
                Frame::Integer(2),
            ]
        );
    }

    #[tokio::test]
    async fn test_protocol_error_keeps_connection() {
        let addr = start_server(4).await;
        let mut stream = TcpStream::connect(&addr).await.unwrap();

        stream.write_all(b"?bogus\r\n").await.unwrap();
        let frames = read_frames(&mut stream, 1).await;
        assert!(matches!(&frames[0], Frame::Error(msg) if msg.starts_with("ERR unknown RESP type")));

        stream.write_all(&cmd(&["PING"])).await.unwrap();
        let frames = read_frames(&mut stream, 1).await;
        assert_eq!(frames[0], Frame::Simple("PONG".to_string()));
    }

    #[tokio::test]
    async fn test_health_check() {
        let addr = start_server(4).await;
        check_server(&addr).await.unwrap();

        // Nothing listening on a freshly released port
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = unused.local_addr().unwrap().to_string();
        drop(unused);
        assert!(check_server(&closed).await.is_err());
    }
}
