// MCP Chroma Bridge - stdio JSON-RPC to HTTP bridge for remote Chroma MCP servers
// Also hosts the OpenAI-compatible embedding adapter used by the vector store client

pub mod cli;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod forwarder;
pub mod mcp;
pub mod vector_store;

pub use config::{BridgeConfig, EmbeddingConfig};
pub use errors::{BridgeError, BridgeResult};
pub use mcp::McpBridge;
