//! End-to-end sessions over in-memory pipes with a scripted upstream.

use async_trait::async_trait;
use mcp_chroma_bridge::{
    forwarder::{Upstream, UpstreamCall},
    mcp::SessionStats,
    BridgeConfig, BridgeError, BridgeResult, McpBridge,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, BufReader, ReadBuf};
use tokio::time::Instant;

type Script = Box<dyn Fn(&UpstreamCall, usize) -> (Duration, BridgeResult<Value>) + Send + Sync>;

/// Upstream whose behavior is a function of the call and the attempt number
/// for that path. Records every attempt with its (virtual) timestamp.
struct ScriptedUpstream {
    attempts: Mutex<Vec<(String, Instant)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    script: Script,
}

impl ScriptedUpstream {
    fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&UpstreamCall, usize) -> (Duration, BridgeResult<Value>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            script: Box::new(script),
        })
    }

    fn attempts_for(&self, path: &str) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, at)| *at)
            .collect()
    }

    fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn send(&self, call: &UpstreamCall) -> BridgeResult<Value> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let previous = attempts.iter().filter(|(p, _)| p == call.path()).count();
            attempts.push((call.path().to_string(), Instant::now()));
            previous + 1
        };

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let (delay, result) = (self.script)(call, attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn config() -> BridgeConfig {
    BridgeConfig::new("http://remote.test", None).unwrap()
}

fn tool_call(id: i64, tool: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": {} }
    })
    .to_string()
}

async fn run_session(
    upstream: Arc<ScriptedUpstream>,
    config: BridgeConfig,
    lines: &[String],
) -> (Vec<Value>, SessionStats) {
    let input = lines.iter().map(|l| format!("{l}\n")).collect::<String>();
    let (stats, responses) = serve_input(upstream, config, input.as_bytes()).await;
    (responses, stats.unwrap())
}

async fn serve_input<R>(
    upstream: Arc<ScriptedUpstream>,
    config: BridgeConfig,
    input: R,
) -> (std::io::Result<SessionStats>, Vec<Value>)
where
    R: AsyncBufRead + Unpin,
{
    let bridge = McpBridge::new(upstream, &config);

    let (output, mut reader) = tokio::io::duplex(1 << 16);
    let collector = tokio::spawn(async move {
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        out
    });

    let stats = bridge.serve(input, output, std::future::pending()).await;
    let out = collector.await.unwrap();

    let responses = out
        .lines()
        .map(|line| serde_json::from_str(line).expect("every output line is one JSON object"))
        .collect();
    (stats, responses)
}

/// Input stream that fails every read.
struct BrokenInput;

impl AsyncRead for BrokenInput {
    fn poll_read(self: Pin<&mut Self>, _: &mut Context<'_>, _: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "stdin broke")))
    }
}

#[tokio::test(start_paused = true)]
async fn one_response_per_request_with_matching_ids() {
    let upstream = ScriptedUpstream::new(|call, _| (Duration::ZERO, Ok(json!({ "path": call.path() }))));
    let lines: Vec<String> = (1..=50).map(|id| tool_call(id, "chroma_list_collections")).collect();

    let (responses, stats) = run_session(upstream, config(), &lines).await;

    assert_eq!(stats.accepted, 50);
    assert_eq!(responses.len(), 50);
    let ids: HashSet<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, (1..=50).collect());
    assert!(responses.iter().all(|r| r.get("result").is_some() && r.get("error").is_none()));
}

#[tokio::test(start_paused = true)]
async fn faster_call_is_written_first() {
    let upstream = ScriptedUpstream::new(|call, _| {
        let delay = if call.path() == "/tools/slow" {
            Duration::from_secs(2)
        } else {
            Duration::ZERO
        };
        (delay, Ok(json!("ok")))
    });

    let (responses, _) = run_session(
        upstream,
        config(),
        &[tool_call(1, "slow"), tool_call(2, "fast")],
    )
    .await;

    let ids: Vec<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 1]);
}

#[tokio::test(start_paused = true)]
async fn malformed_line_does_not_block_neighbours() {
    let upstream = ScriptedUpstream::new(|_, _| (Duration::ZERO, Ok(json!({}))));
    let lines = vec![
        tool_call(1, "chroma_list_collections"),
        "{this is not json".to_string(),
        tool_call(2, "chroma_list_collections"),
    ];

    let (responses, stats) = run_session(upstream, config(), &lines).await;

    assert_eq!(stats.malformed, 1);
    let mut ids: Vec<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn connection_resets_are_retried_with_growing_backoff() {
    let upstream = ScriptedUpstream::new(|_, attempt| {
        if attempt < 3 {
            (
                Duration::ZERO,
                Err(BridgeError::Transport {
                    reason: "connection reset by peer".into(),
                }),
            )
        } else {
            (Duration::ZERO, Ok(json!(["docs"])))
        }
    });

    let (responses, _) = run_session(upstream.clone(), config(), &[tool_call(7, "chroma_list_collections")]).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 7);
    assert!(responses[0].get("result").is_some());

    let attempts = upstream.attempts_for("/tools/chroma_list_collections");
    assert_eq!(attempts.len(), 3);
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.windows(2).all(|g| g[0] <= g[1]), "delays must not shrink: {gaps:?}");
    assert!(gaps[0] >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn bad_request_is_not_retried() {
    let upstream = ScriptedUpstream::new(|_, _| {
        (
            Duration::ZERO,
            Err(BridgeError::Upstream {
                status: 400,
                message: "collection_name is required".into(),
            }),
        )
    });

    let (responses, _) = run_session(upstream.clone(), config(), &[tool_call(3, "chroma_create_collection")]).await;

    assert_eq!(upstream.total_attempts(), 1);
    assert_eq!(responses[0]["id"], 3);
    assert_eq!(responses[0]["error"]["code"], -32002);
    assert_eq!(responses[0]["error"]["data"]["status"], 400);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_become_an_error_response() {
    let upstream = ScriptedUpstream::new(|_, _| {
        (
            Duration::ZERO,
            Err(BridgeError::Upstream {
                status: 503,
                message: "Service Unavailable".into(),
            }),
        )
    });

    let (responses, stats) = run_session(upstream.clone(), config(), &[tool_call(4, "chroma_peek_collection")]).await;

    assert_eq!(upstream.total_attempts(), 3);
    assert_eq!(stats.abandoned, 0);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["error"]["data"]["status"], 503);
}

#[tokio::test(start_paused = true)]
async fn local_methods_and_notifications_skip_the_remote() {
    let upstream = ScriptedUpstream::new(|_, _| (Duration::ZERO, Ok(json!({}))));
    let lines = vec![
        json!({"jsonrpc": "2.0", "id": "init", "method": "initialize", "params": {"protocolVersion": "2025-03-26"}}).to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {}}).to_string(),
    ];

    let (responses, stats) = run_session(upstream.clone(), config(), &lines).await;

    assert_eq!(upstream.total_attempts(), 0);
    assert_eq!(stats.notifications, 1);
    assert_eq!(responses.len(), 2);

    let init = responses.iter().find(|r| r["id"] == "init").unwrap();
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");
    let bad_call = responses.iter().find(|r| r["id"] == 2).unwrap();
    assert_eq!(bad_call["error"]["code"], -32602);
}

#[tokio::test(start_paused = true)]
async fn remote_envelope_id_is_replaced_by_request_id() {
    let upstream = ScriptedUpstream::new(|_, _| {
        (
            Duration::ZERO,
            Ok(json!({"jsonrpc": "2.0", "id": "someone-else", "result": {"resources": []}})),
        )
    });
    let line = json!({"jsonrpc": "2.0", "id": 11, "method": "resources/list"}).to_string();

    let (responses, _) = run_session(upstream, config(), &[line]).await;

    assert_eq!(responses[0]["id"], 11);
    assert_eq!(responses[0]["result"], json!({"resources": []}));
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded_by_pool_size() {
    let upstream = ScriptedUpstream::new(|_, _| (Duration::from_millis(100), Ok(json!({}))));
    let mut config = config();
    config.max_concurrency = 2;
    let lines: Vec<String> = (1..=10).map(|id| tool_call(id, "chroma_get_documents")).collect();

    let (responses, _) = run_session(upstream.clone(), config, &lines).await;

    assert_eq!(responses.len(), 10);
    assert_eq!(upstream.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn calls_past_the_grace_period_are_abandoned_silently() {
    let upstream = ScriptedUpstream::new(|call, _| {
        let delay = if call.path() == "/tools/hang" {
            Duration::from_secs(3600)
        } else {
            Duration::ZERO
        };
        (delay, Ok(json!({})))
    });
    let mut config = config();
    config.shutdown_grace = Duration::from_secs(1);

    let (responses, stats) = run_session(upstream, config, &[tool_call(1, "hang"), tool_call(2, "quick")]).await;

    assert_eq!(stats.abandoned, 1);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 2);
}

#[tokio::test(start_paused = true)]
async fn read_error_still_answers_accepted_requests() {
    let upstream = ScriptedUpstream::new(|_, _| (Duration::from_millis(200), Ok(json!({}))));
    let line = format!("{}\n", tool_call(1, "chroma_list_collections"));
    let input = BufReader::new(line.as_bytes().chain(BrokenInput));

    let (result, responses) = serve_input(upstream, config(), input).await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "stdin broke");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 1);
    assert!(responses[0].get("result").is_some());
}

#[tokio::test(start_paused = true)]
async fn oversized_line_is_skipped_and_reading_continues() {
    let upstream = ScriptedUpstream::new(|_, _| (Duration::ZERO, Ok(json!({}))));
    let mut config = config();
    config.max_line_bytes = 256;
    let huge = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#, "x".repeat(4096));

    let (responses, stats) = run_session(upstream, config, &[huge, tool_call(2, "chroma_list_collections")]).await;

    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.accepted, 1);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], 2);
}
