// Response Writer - serialized, line-atomic writes to the protocol channel
use crate::errors::{codes, JsonRpcError};
use crate::mcp::types::JsonRpcResponse;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error};

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared handle to the output stream.
///
/// Every response is serialized up front and written as one complete line
/// while holding the lock, so concurrent completions never interleave.
#[derive(Clone)]
pub struct ResponseWriter {
    sink: Arc<Mutex<Sink>>,
}

impl ResponseWriter {
    pub fn new<W>(sink: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub async fn write(&self, response: &JsonRpcResponse) -> std::io::Result<()> {
        let mut line = encode(response);
        line.push(b'\n');

        let mut sink = self.sink.lock().await;
        sink.write_all(&line).await?;
        sink.flush().await?;
        drop(sink);

        debug!(id = %response.id, error = response.is_error(), "Sent response");
        Ok(())
    }
}

fn encode(response: &JsonRpcResponse) -> Vec<u8> {
    match serde_json::to_vec(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(id = %response.id, error = %e, "Failed to serialize response");
            let fallback = JsonRpcResponse::failure(
                response.id.clone(),
                JsonRpcError {
                    code: codes::INTERNAL_ERROR,
                    message: format!("Failed to serialize response: {}", e),
                    data: None,
                },
            );
            // Contains only strings and integers, cannot fail.
            serde_json::to_vec(&fallback).unwrap_or_default()
        }
    }
}
