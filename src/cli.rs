//! Command-line arguments for the bridge binary.

use clap::{Parser, Subcommand};

/// Stdio to HTTP bridge for remote Chroma MCP servers.
#[derive(Parser, Debug)]
#[command(name = "mcp-chroma-bridge", version, about)]
pub struct Cli {
    /// Remote MCP server base URL.
    #[arg(long, env = "MCP_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Bearer token for the remote server.
    #[arg(long, env = "MCP_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Enable debug logging on stderr.
    #[arg(long)]
    pub debug: bool,

    /// Deadline for a single HTTP attempt, in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Maximum number of concurrently forwarded requests.
    #[arg(long, default_value_t = 16)]
    pub max_concurrency: usize,

    /// How long in-flight requests may run after stdin closes, in seconds.
    #[arg(long, default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    /// Upper bound for the retry backoff, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub max_retry_delay_ms: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed the given texts with the configured embedding endpoint and
    /// report the vector dimensions on stderr.
    ProbeEmbeddings {
        #[arg(required = true)]
        texts: Vec<String>,
    },
}
