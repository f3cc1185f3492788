//! Interactive terminal client for `switchboard connect`.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use futures::{SinkExt, StreamExt};
use std::io::Write;
use switchboard_core::protocol::{ClientFrame, ServerFrame};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    handshake::client::Request,
    http::HeaderValue,
};

use crate::handlers::connect::{NAME_HEADER, TYPE_HEADER};

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/connect";

pub struct ConnectOptions {
    pub url: String,
    pub name: Option<String>,
    pub agent: bool,
}

/// Build the upgrade request carrying the `Name` and `Type` headers.
pub fn connect_request(url: &str, name: &str, agent: bool) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("Invalid server URL: {url}"))?;
    let headers = request.headers_mut();
    headers.insert(
        NAME_HEADER,
        HeaderValue::from_str(name).context("Name contains characters not allowed in a header")?,
    );
    if agent {
        headers.insert(TYPE_HEADER, HeaderValue::from_static("S"));
    }
    Ok(request)
}

/// Render one server frame for the terminal. Unparseable frames are shown raw.
pub fn render_frame(text: &str, at: DateTime<Local>) -> String {
    let stamp = at.format("%H:%M:%S");
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => format!("[{stamp}] {frame}"),
        Err(_) => format!("[{stamp}] {text}"),
    }
}

pub fn encode_line(line: &str) -> Result<String> {
    serde_json::to_string(&ClientFrame {
        body: line.to_string(),
    })
    .context("Failed to encode message")
}

pub async fn run(opts: ConnectOptions) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let name = match opts.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => name,
        None => {
            print!("What is your name? ");
            std::io::stdout().flush()?;
            stdin
                .next_line()
                .await?
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .context("No name given")?
        }
    };

    let request = connect_request(&opts.url, &name, opts.agent)?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("Failed to connect to {}", opts.url))?;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            line = stdin.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let json = encode_line(&line)?;
                if ws_write.send(tungstenite::Message::Text(json.into())).await.is_err() {
                    eprintln!("Connection lost");
                    return Ok(());
                }
            }
            msg = ws_read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        println!("{}", render_frame(text.as_str(), Local::now()));
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        eprintln!("Server closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        eprintln!("Connection error: {e}");
                        return Ok(());
                    }
                }
            }
        }
    }

    // Best effort: the server may already be gone
    let _ = ws_write.send(tungstenite::Message::Close(None)).await;
    let _ = ws_write.close().await;
    Ok(())
}
