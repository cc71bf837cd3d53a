// MCP Chroma Bridge Entry Point
// Lets stdio-only MCP clients reach a remote Chroma MCP server over HTTP.
// stdout carries protocol frames only; every diagnostic goes to stderr.
use anyhow::Result;
use clap::Parser;
use mcp_chroma_bridge::{
    cli::{Cli, Command},
    embeddings::{EmbeddingFunction, EmbeddingProviders},
    BridgeConfig, BridgeError, EmbeddingConfig, McpBridge,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let code = match run(&cli).await {
        Ok(()) => 0,
        Err(e) => match e.downcast_ref::<BridgeError>() {
            Some(BridgeError::Configuration(msg)) => {
                error!("❌ {}", msg);
                EXIT_CONFIG_ERROR
            }
            _ => {
                error!("❌ Bridge error: {:#}", e);
                1
            }
        },
    };

    // The blocking stdin reader would otherwise keep the runtime alive.
    std::process::exit(code);
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let embedding_config = EmbeddingConfig::from_env()?;
    let providers = EmbeddingProviders::from_config(embedding_config.as_ref())
        .map_err(|e| BridgeError::Configuration(e.to_string()))?;
    info!(providers = ?providers.available(), "Embedding providers");

    match &cli.command {
        Some(Command::ProbeEmbeddings { texts }) => probe_embeddings(&providers, texts).await,
        None => {
            let config = BridgeConfig::from_cli(cli)?;
            info!(
                remote_url = %config.remote_url,
                auth = config.auth_token.is_some(),
                max_concurrency = config.max_concurrency,
                "Starting MCP Chroma bridge"
            );

            let bridge = McpBridge::from_config(&config)?;
            let stats = bridge.run_stdio().await?;
            info!(
                accepted = stats.accepted,
                malformed = stats.malformed,
                "✅ Session finished"
            );
            Ok(())
        }
    }
}

async fn probe_embeddings(providers: &EmbeddingProviders, texts: &[String]) -> Result<()> {
    let provider = providers.select(Some("custom"))?;
    let Some(embedder) = provider.function() else {
        anyhow::bail!("provider '{}' cannot embed in this process", provider.name());
    };

    let vectors = embedder.embed(texts).await?;
    for (text, vector) in texts.iter().zip(&vectors) {
        info!(text = %text, dimension = vector.len(), "Embedded");
    }
    info!(
        provider = embedder.name(),
        count = vectors.len(),
        dimension = embedder.dimension(),
        "✅ Embedding endpoint OK"
    );
    Ok(())
}
