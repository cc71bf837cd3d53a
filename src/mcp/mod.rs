// MCP stdio side of the bridge
pub mod framing;
pub mod server;
pub mod types;
pub mod writer;

pub use server::{McpBridge, SessionStats};
pub use types::{JsonRpcRequest, JsonRpcResponse, RequestId};
pub use writer::ResponseWriter;
