// MCP Bridge - stdio read loop and request dispatch
use crate::{
    config::BridgeConfig,
    errors::{BridgeError, BridgeResult},
    forwarder::{Forwarder, HttpUpstream, Upstream},
    mcp::{
        framing::{decode_line, read_line_bounded, Incoming, LineRead},
        types::{JsonRpcRequest, JsonRpcResponse},
        writer::ResponseWriter,
    },
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Per-process session: everything a request needs, built once at startup.
pub struct McpBridge {
    forwarder: Arc<Forwarder>,
    limiter: Arc<Semaphore>,
    shutdown_grace: Duration,
    max_line_bytes: usize,
}

/// What happened during one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub accepted: usize,
    pub malformed: usize,
    pub notifications: usize,
    /// Requests still running when the shutdown grace period ran out.
    pub abandoned: usize,
}

impl McpBridge {
    pub fn new(upstream: Arc<dyn Upstream>, config: &BridgeConfig) -> Self {
        Self {
            forwarder: Arc::new(Forwarder::new(upstream, config.retry)),
            limiter: Arc::new(Semaphore::new(config.max_concurrency)),
            shutdown_grace: config.shutdown_grace,
            max_line_bytes: config.max_line_bytes,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let upstream = HttpUpstream::new(config)?;
        Ok(Self::new(Arc::new(upstream), config))
    }

    /// Serve stdin/stdout until stdin closes or Ctrl-C is received.
    pub async fn run_stdio(self) -> std::io::Result<SessionStats> {
        info!("🔗 MCP bridge listening on stdio");
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout, shutdown_signal()).await
    }

    /// Read requests from `input` and write responses to `output`.
    ///
    /// The read loop never waits on a forwarder call: each request runs in its
    /// own task and the concurrency limit is enforced inside that task. A read
    /// error ends the session like EOF does; accepted requests are still
    /// drained before the error is returned.
    pub async fn serve<R, W, S>(self, input: R, output: W, shutdown: S) -> std::io::Result<SessionStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
        S: Future<Output = ()>,
    {
        let writer = ResponseWriter::new(output);
        let mut input = input;
        let mut in_flight = JoinSet::new();
        let mut stats = SessionStats::default();
        let mut read_error = None;
        let mut buf = Vec::new();
        tokio::pin!(shutdown);

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer reading input");
                    break;
                }
                read = read_line_bounded(&mut input, &mut buf, self.max_line_bytes) => read,
            };

            match read {
                Ok(LineRead::Line) => self.accept(&buf, &writer, &mut in_flight, &mut stats),
                Ok(LineRead::TooLarge) => {
                    stats.malformed += 1;
                    warn!(max_bytes = self.max_line_bytes, "Skipping oversized input line");
                }
                Ok(LineRead::Eof) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "❌ Failed to read input");
                    read_error = Some(e);
                    break;
                }
            }

            while let Some(finished) = in_flight.try_join_next() {
                log_join(finished);
            }
        }

        stats.abandoned = self.drain(&mut in_flight).await;
        info!(
            accepted = stats.accepted,
            malformed = stats.malformed,
            abandoned = stats.abandoned,
            "MCP bridge shutting down"
        );
        match read_error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    fn accept(
        &self,
        raw: &[u8],
        writer: &ResponseWriter,
        in_flight: &mut JoinSet<()>,
        stats: &mut SessionStats,
    ) {
        let decoded = std::str::from_utf8(raw)
            .map_err(|e| BridgeError::Protocol(format!("invalid UTF-8: {}", e)))
            .and_then(|line| {
                let line = line.trim();
                if line.is_empty() {
                    Ok(None)
                } else {
                    decode_line(line).map(Some)
                }
            });

        match decoded {
            Ok(None) => {}
            Ok(Some(Incoming::Notification { method })) => {
                stats.notifications += 1;
                debug!(method = %method, "Ignoring notification");
            }
            Ok(Some(Incoming::Request(request))) => {
                stats.accepted += 1;
                debug!(id = %request.id, method = %request.method, "📨 Received request");
                in_flight.spawn(handle(
                    request,
                    self.forwarder.clone(),
                    self.limiter.clone(),
                    writer.clone(),
                ));
            }
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "Skipping malformed input line");
            }
        }
    }

    /// Wait for in-flight requests up to the grace period, then abandon the
    /// rest without responding. Returns the number abandoned.
    async fn drain(&self, in_flight: &mut JoinSet<()>) -> usize {
        if in_flight.is_empty() {
            return 0;
        }

        info!(in_flight = in_flight.len(), "Waiting for in-flight requests");
        let finished = tokio::time::timeout(self.shutdown_grace, async {
            while let Some(result) = in_flight.join_next().await {
                log_join(result);
            }
        })
        .await;

        if finished.is_ok() {
            return 0;
        }

        let abandoned = in_flight.len();
        warn!(abandoned, "Shutdown grace period elapsed, abandoning requests");
        in_flight.shutdown().await;
        abandoned
    }
}

async fn handle(
    request: JsonRpcRequest,
    forwarder: Arc<Forwarder>,
    limiter: Arc<Semaphore>,
    writer: ResponseWriter,
) {
    let response = match limiter.acquire_owned().await {
        Ok(_permit) => forwarder.forward(&request).await,
        Err(_) => JsonRpcResponse::from_error(
            request.id.clone(),
            &BridgeError::Internal("request pool closed".to_string()),
        ),
    };

    if let Err(e) = writer.write(&response).await {
        error!(id = %request.id, error = %e, "❌ Failed to write response");
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Request task panicked");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl-C, relying on stdin close");
        futures::future::pending::<()>().await;
    }
}
