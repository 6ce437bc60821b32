use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};

pub const GRAPH_QUERY_TOOL: &str = "graph_query";

pub trait QueryClient: Send + Sync {
    /// Returns the text payload of the response; empty when none was parseable.
    fn graph_query(&self, query: &str) -> Result<String>;
}

pub struct HttpQueryClient {
    endpoint: String,
    agent: ureq::Agent,
    next_id: AtomicU64,
}

impl HttpQueryClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .timeout(timeout)
            .build();
        Self {
            endpoint: endpoint.to_string(),
            agent,
            next_id: AtomicU64::new(1),
        }
    }
}

impl QueryClient for HttpQueryClient {
    fn graph_query(&self, query: &str) -> Result<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = build_tool_call(id, GRAPH_QUERY_TOOL, query);

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json, text/event-stream")
            .send_string(&payload.to_string());

        let body = match response {
            Ok(response) => response
                .into_string()
                .with_context(|| format!("failed to read response body from {}", self.endpoint))?,
            Err(ureq::Error::Status(code, _)) => {
                bail!("query endpoint returned http status {code}")
            }
            Err(ureq::Error::Transport(transport)) => {
                bail!("query endpoint transport error: {transport}")
            }
        };

        Ok(parse_query_payload(&body))
    }
}

fn build_tool_call(id: u64, tool: &str, query: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {
            "name": tool,
            "arguments": {
                "query": query,
                "language": "natural",
                "limit": 20,
            },
        },
    })
}

/// Accepts a plain JSON body or an event stream whose last `data:` event holds it.
pub fn parse_query_payload(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let last_event = raw
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .last();
    let document = last_event.unwrap_or(raw);

    serde_json::from_str::<Value>(document)
        .ok()
        .and_then(|value| {
            value
                .pointer("/result/content/0/text")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_payload_reads_plain_json() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"12 modules"}]}}"#;
        assert_eq!(parse_query_payload(raw), "12 modules");
    }

    #[test]
    fn parse_query_payload_uses_last_stream_event() {
        let raw = concat!(
            "event: message\n",
            "data: {\"result\":{\"content\":[{\"text\":\"partial\"}]}}\n",
            "\n",
            "event: message\n",
            "data: {\"result\":{\"content\":[{\"text\":\"final answer\"}]}}\n",
        );
        assert_eq!(parse_query_payload(raw), "final answer");
    }

    #[test]
    fn parse_query_payload_treats_missing_payload_as_empty() {
        assert_eq!(parse_query_payload(""), "");
        assert_eq!(parse_query_payload("not json at all"), "");
        assert_eq!(parse_query_payload(r#"{"error":{"code":-32601}}"#), "");
        assert_eq!(parse_query_payload("data: {broken"), "");
    }

    #[test]
    fn tool_call_names_graph_query() {
        let payload = build_tool_call(7, GRAPH_QUERY_TOOL, "structure");
        assert_eq!(payload["id"], 7);
        assert_eq!(payload["method"], "tools/call");
        assert_eq!(payload["params"]["name"], "graph_query");
        assert_eq!(payload["params"]["arguments"]["query"], "structure");
        assert_eq!(payload["params"]["arguments"]["limit"], 20);
    }

    #[test]
    fn unreachable_endpoint_is_an_error_not_a_panic() {
        let client = HttpQueryClient::new("http://127.0.0.1:1/mcp", Duration::from_millis(200));
        assert!(client.graph_query("structure").is_err());
    }
}
