use anyhow::{Context, Result};
use eventsource_client::{self as es, Client};
use futures_util::stream::StreamExt;
use log::*;
use sse::message::StatusEvent;
use tokio::sync::mpsc;

/// One thing observed on a status stream.
#[derive(Debug)]
pub enum Received {
    Status(StatusEvent),
    /// A `status` event whose body is not a status update.
    Unparsed(String),
    /// The relay's final `error` event.
    Error(String),
    Closed,
}

pub struct Connection {
    event_rx: mpsc::UnboundedReceiver<Received>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Connection {
    pub fn establish(base_url: &str, test_id: &str, token: Option<&str>) -> Result<Self> {
        let url = format!("{}/status-stream/{}", base_url.trim_end_matches('/'), test_id);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut builder = es::ClientBuilder::for_url(&url)?
            .reconnect(es::ReconnectOptions::reconnect(false).build());
        if let Some(token) = token {
            builder = builder.header("Authorization", &format!("Bearer {token}"))?;
        }
        let client = builder.build();

        let handle = tokio::spawn(async move {
            let mut stream = client.stream();

            loop {
                let received = match stream.next().await {
                    Some(Ok(es::SSE::Event(event))) => match event.event_type.as_str() {
                        "status" => parse_status(&event.data),
                        "error" => Received::Error(parse_error(&event.data)),
                        other => {
                            debug!("Ignoring {other} event");
                            continue;
                        }
                    },
                    Some(Ok(es::SSE::Comment(comment))) => {
                        trace!("Comment: {comment}");
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!("Status stream error: {e:?}");
                        Received::Closed
                    }
                    None => Received::Closed,
                };

                let done = matches!(received, Received::Error(_) | Received::Closed);
                if tx.send(received).is_err() || done {
                    break;
                }
            }
            debug!("Status stream for {url} finished");
        });

        Ok(Self {
            event_rx: rx,
            _handle: handle,
        })
    }

    #[cfg(test)]
    pub fn from_channel(event_rx: mpsc::UnboundedReceiver<Received>) -> Self {
        Self {
            event_rx,
            _handle: tokio::spawn(async {}),
        }
    }

    pub async fn next(&mut self) -> Received {
        self.event_rx.recv().await.unwrap_or(Received::Closed)
    }
}

/// Fetches the current status snapshot through the compute proxy.
pub async fn fetch_status(base_url: &str, test_id: &str, token: Option<&str>) -> Result<String> {
    let url = format!("{}/tests/{}/status", base_url.trim_end_matches('/'), test_id);
    let mut request = reqwest::Client::new().get(&url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        anyhow::bail!("Status snapshot failed with {status}: {body}");
    }
    Ok(body)
}

fn parse_status(data: &str) -> Received {
    match serde_json::from_str::<StatusEvent>(data) {
        Ok(event) => Received::Status(event),
        Err(_) => Received::Unparsed(data.to_string()),
    }
}

fn parse_error(data: &str) -> String {
    serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| data.to_string())
}
