//! Web search through Perplexity's chat-completions endpoint with structured (JSON-schema) output.
//!
//! Interpretation of the response is split into pure steps so each one can be tested alone:
//! [`parse_payload`] turns the message content into a [`SearchPayload`], then the
//! [`SOURCE_STRATEGIES`] are tried in order and the first non-empty source list wins.

use crate::config::Config;
use devscope_core::{Error, Result, SearchRequest, SearchResult, Source, WebSearch};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(80);
const SEARCH_MAX_TOKENS: u64 = 1_024;

const SYSTEM_PROMPT: &str = "You are a dev tooling research assistant. Use web search to find \
high-quality, recent sources about developer tools, platforms, and AI assistants \
related to the user's question. \
Return a JSON object with a short 'summary' and a 'sources' array. \
Each source must include the URL and, if possible, a short snippet. \
Do NOT add commentary outside the JSON.";

/// Expected shape of the structured output.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "sources": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "url": { "type": "string" },
                        "snippet": { "type": "string" }
                    },
                    "required": ["url"]
                }
            }
        },
        "required": ["sources"]
    })
}

#[derive(Debug, Clone)]
pub struct PerplexitySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl PerplexitySearch {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            timeout: SEARCH_TIMEOUT,
        }
    }

    pub fn from_config(client: reqwest::Client, cfg: &Config) -> Result<Self> {
        let api_key = cfg.perplexity_api_key.clone().ok_or_else(|| {
            Error::NotConfigured(
                "missing DEVSCOPE_PERPLEXITY_API_KEY (or PERPLEXITY_API_KEY)".to_string(),
            )
        })?;
        Ok(Self::new(
            client,
            api_key,
            cfg.perplexity_endpoint.clone(),
            cfg.search_model.clone(),
        ))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build_request(&self, req: &SearchRequest) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: req.query.clone(),
                },
            ],
            search_mode: "web".to_string(),
            search_recency_filter: req.recency.as_str().to_string(),
            temperature: 0.0,
            max_tokens: SEARCH_MAX_TOKENS,
            web_search_options: WebSearchOptions {
                search_context_size: "high".to_string(),
            },
            response_format: ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "web_research_results".to_string(),
                    schema: response_schema(),
                    strict: true,
                },
            },
        }
    }

    pub async fn chat_completions(
        &self,
        req: &ChatCompletionsRequest,
    ) -> Result<ChatCompletionsResponse> {
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!(
                "perplexity chat.completions HTTP {status}"
            )));
        }

        resp.json().await.map_err(|e| Error::Search(e.to_string()))
    }
}

#[async_trait::async_trait]
impl WebSearch for PerplexitySearch {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    async fn search(&self, req: &SearchRequest) -> Result<SearchResult> {
        let t0 = Instant::now();
        let body = self.build_request(req);
        let resp = self.chat_completions(&body).await?;
        let out = interpret_response(&resp, req.max_results);
        tracing::info!(
            provider = self.name(),
            sources = out.sources.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "web search finished"
        );
        Ok(out)
    }
}

/// Structured payload embedded in the first choice's message content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPayload {
    pub summary: String,
    pub sources: Vec<Source>,
}

/// Parse message content leniently.
///
/// Invalid JSON falls back to `{summary: <raw text>, sources: []}`. Valid JSON of the wrong
/// shape contributes whatever fields it does carry; entries without a `url` string keep an
/// empty url.
pub fn parse_payload(raw: &str) -> SearchPayload {
    let v: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            let preview: String = raw.chars().take(200).collect();
            tracing::warn!(error = %e, raw = %preview, "search payload is not valid JSON; using fallback");
            return SearchPayload {
                summary: raw.to_string(),
                sources: Vec::new(),
            };
        }
    };

    let summary = v
        .get("summary")
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string();
    let sources = v
        .get("sources")
        .and_then(|s| s.as_array())
        .map(|items| items.iter().filter_map(source_from_value).collect())
        .unwrap_or_default();
    SearchPayload { summary, sources }
}

fn source_from_value(v: &serde_json::Value) -> Option<Source> {
    let obj = v.as_object()?;
    let field = |k: &str| obj.get(k).and_then(|x| x.as_str()).map(str::to_string);
    Some(Source {
        title: field("title"),
        url: field("url").unwrap_or_default(),
        snippet: field("snippet"),
    })
}

/// One way of deriving a source list from a parsed payload and its envelope.
pub type SourceStrategy = fn(&SearchPayload, &ChatCompletionsResponse) -> Vec<Source>;

/// Tried in order; the first result with at least one usable (url-bearing) source wins.
pub const SOURCE_STRATEGIES: &[(&str, SourceStrategy)] = &[
    ("payload_sources", payload_sources as SourceStrategy),
    ("search_results", search_results_sources as SourceStrategy),
];

pub fn payload_sources(payload: &SearchPayload, _resp: &ChatCompletionsResponse) -> Vec<Source> {
    payload.sources.clone()
}

/// Raw search hits carried next to `choices`; snippets are not available there.
///
/// Read leniently: a non-array field or non-object entries contribute nothing.
pub fn search_results_sources(
    _payload: &SearchPayload,
    resp: &ChatCompletionsResponse,
) -> Vec<Source> {
    resp.search_results
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|hits| {
            hits.iter()
                .filter_map(source_from_value)
                .map(|s| Source {
                    snippet: Some(String::new()),
                    ..s
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn interpret_response(resp: &ChatCompletionsResponse, max_results: usize) -> SearchResult {
    let content = resp
        .choices
        .first()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or_default();
    let payload = parse_payload(content);

    let mut sources = Vec::new();
    for (name, strategy) in SOURCE_STRATEGIES {
        let found = strategy(&payload, resp);
        // A list with no url-bearing entry cannot ground anything; try the next strategy.
        if found.iter().any(Source::has_url) {
            tracing::debug!(strategy = *name, count = found.len(), "sources extracted");
            sources = found;
            break;
        }
    }
    sources.truncate(max_results);

    SearchResult {
        summary: payload.summary,
        sources,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub search_mode: String,
    pub search_recency_filter: String,
    pub temperature: f64,
    pub max_tokens: u64,
    pub web_search_options: WebSearchOptions,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchOptions {
    pub search_context_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: serde_json::Value,
    pub strict: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionsResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Kept untyped so an odd shape here never fails the whole envelope.
    #[serde(default)]
    pub search_results: Option<serde_json::Value>,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: Option<u64>,
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use devscope_core::Recency;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    fn envelope(content: &str, search_results: Option<serde_json::Value>) -> ChatCompletionsResponse {
        let mut v = serde_json::json!({
            "id": "x",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        });
        if let Some(sr) = search_results {
            v["search_results"] = sr;
        }
        serde_json::from_value(v).unwrap()
    }

    fn payload_json(n: usize) -> String {
        let sources: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "title": format!("T{i}"),
                    "url": format!("https://example.com/{i}"),
                    "snippet": format!("s{i}")
                })
            })
            .collect();
        serde_json::json!({ "summary": "sum", "sources": sources }).to_string()
    }

    #[test]
    fn well_formed_payload_is_used_directly() {
        let out = interpret_response(&envelope(&payload_json(2), None), 6);
        assert_eq!(out.summary, "sum");
        assert_eq!(out.sources.len(), 2);
        assert_eq!(out.sources[1].url, "https://example.com/1");
        assert_eq!(out.sources[1].snippet.as_deref(), Some("s1"));
    }

    #[test]
    fn invalid_json_falls_back_to_raw_summary_and_no_sources() {
        let raw = "Here are some tools: not json at all";
        let out = interpret_response(&envelope(raw, None), 6);
        assert_eq!(out.summary, raw);
        assert!(out.sources.is_empty());
    }

    #[test]
    fn invalid_json_recovers_sources_from_search_results() {
        let raw = "```json broken";
        let hits = serde_json::json!([
            { "title": "A", "url": "https://a.example/" },
            { "title": "B", "url": "https://b.example/", "date": "2024-01-01" }
        ]);
        let out = interpret_response(&envelope(raw, Some(hits)), 6);
        assert_eq!(out.summary, raw);
        assert_eq!(out.sources.len(), 2);
        assert_eq!(out.sources[0].title.as_deref(), Some("A"));
        assert_eq!(out.sources[0].snippet.as_deref(), Some(""));
    }

    #[test]
    fn empty_payload_sources_use_search_results() {
        let content = serde_json::json!({ "summary": "s", "sources": [] }).to_string();
        let hits = serde_json::json!([{ "title": "A", "url": "https://a.example/" }]);
        let out = interpret_response(&envelope(&content, Some(hits)), 6);
        assert_eq!(out.summary, "s");
        assert_eq!(out.sources.len(), 1);
    }

    #[test]
    fn payload_sources_win_over_search_results() {
        let hits = serde_json::json!([{ "title": "raw", "url": "https://raw.example/" }]);
        let out = interpret_response(&envelope(&payload_json(1), Some(hits)), 6);
        assert_eq!(out.sources[0].title.as_deref(), Some("T0"));
    }

    #[test]
    fn sources_are_capped_at_max_results_preserving_order() {
        let out = interpret_response(&envelope(&payload_json(10), None), 6);
        assert_eq!(out.sources.len(), 6);
        let urls: Vec<_> = out.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls[0], "https://example.com/0");
        assert_eq!(urls[5], "https://example.com/5");

        let hits: Vec<serde_json::Value> = (0..9)
            .map(|i| serde_json::json!({ "url": format!("https://h/{i}") }))
            .collect();
        let out = interpret_response(&envelope("nope", Some(serde_json::json!(hits))), 3);
        assert_eq!(out.sources.len(), 3);
    }

    #[test]
    fn wrong_shape_json_is_tolerated() {
        let p = parse_payload("[1, 2, 3]");
        assert_eq!(p, SearchPayload::default());

        let p = parse_payload(r#"{"summary": 5, "sources": [{"title": "no url"}, 7, {"url": "https://x/"}]}"#);
        assert_eq!(p.summary, "");
        assert_eq!(p.sources.len(), 2);
        assert!(!p.sources[0].has_url());
        assert_eq!(p.sources[1].url, "https://x/");
    }

    #[test]
    fn url_less_payload_sources_fall_through_to_search_results() {
        let content = serde_json::json!({ "summary": "s", "sources": [{ "title": "x" }] }).to_string();
        let hits = serde_json::json!([{ "title": "A", "url": "https://a.example/" }]);
        let out = interpret_response(&envelope(&content, Some(hits)), 6);
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].url, "https://a.example/");
        assert_eq!(out.summary, "s");
    }

    #[test]
    fn null_content_envelope_parses_and_recovers_from_search_results() {
        let raw = r#"{"choices":[{"message":{"content":null}}],
            "search_results":[{"title":"A","url":"https://a.example/"}]}"#;
        let resp: ChatCompletionsResponse = serde_json::from_str(raw).unwrap();
        let out = interpret_response(&resp, 6);
        assert_eq!(out.summary, "");
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].title.as_deref(), Some("A"));
    }

    #[test]
    fn odd_search_results_shapes_are_tolerated() {
        let raw = r#"{"choices":[{"message":{"content":"not json"}}],
            "search_results":["junk", 3, null, {"url": 7}, {"title":"B","url":"https://b.example/"}]}"#;
        let resp: ChatCompletionsResponse = serde_json::from_str(raw).unwrap();
        let out = interpret_response(&resp, 6);
        let urls: Vec<_> = out.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["", "https://b.example/"]);
        assert_eq!(out.sources[1].snippet.as_deref(), Some(""));

        let raw = r#"{"choices":[{}],"search_results":{"not":"an array"}}"#;
        let resp: ChatCompletionsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(interpret_response(&resp, 6), SearchResult::default());
    }

    #[test]
    fn missing_choices_is_not_an_error() {
        let out = interpret_response(&ChatCompletionsResponse::default(), 6);
        assert_eq!(out, SearchResult::default());
    }

    #[test]
    fn request_declares_schema_recency_and_zero_temperature() {
        let client = PerplexitySearch::new(reqwest::Client::new(), "k", "http://unused", "sonar-pro");
        let req = client.build_request(&SearchRequest::new("q", Recency::Month));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["search_mode"], "web");
        assert_eq!(v["search_recency_filter"], "month");
        assert_eq!(v["temperature"], 0.0);
        assert_eq!(v["response_format"]["type"], "json_schema");
        assert_eq!(v["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            v["response_format"]["json_schema"]["schema"]["properties"]["sources"]["items"]["required"],
            serde_json::json!(["url"])
        );
        assert_eq!(v["messages"][1]["content"], "q");
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn search_round_trip_against_local_endpoint() {
        let seen: Arc<Mutex<Option<(String, serde_json::Value)>>> = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(
                move |headers: axum::http::HeaderMap, Json(body): Json<serde_json::Value>| {
                    let seen = seen2.clone();
                    async move {
                        let auth = headers
                            .get(axum::http::header::AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        *seen.lock().unwrap() = Some((auth, body));
                        Json(serde_json::json!({
                            "choices": [{ "message": { "content": payload_json(8) } }]
                        }))
                    }
                },
            ),
        );
        let addr = serve(app).await;
        let client = PerplexitySearch::new(
            reqwest::Client::new(),
            "pplx-test",
            format!("http://{addr}/chat/completions"),
            "sonar-pro",
        );

        let out = client
            .search(&SearchRequest::new("rust tools", Recency::Week))
            .await
            .unwrap();
        assert_eq!(out.sources.len(), 6);

        let (auth, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer pplx-test");
        assert_eq!(body["model"], "sonar-pro");
        assert_eq!(body["messages"][1]["content"], "rust tools");
    }

    #[tokio::test]
    async fn null_content_over_http_is_not_a_search_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                Json(serde_json::json!({
                    "choices": [{ "message": { "role": "assistant", "content": null } }],
                    "search_results": [
                        "junk",
                        { "title": "A", "url": "https://a.example/" }
                    ]
                }))
            }),
        );
        let addr = serve(app).await;
        let client = PerplexitySearch::new(
            reqwest::Client::new(),
            "k",
            format!("http://{addr}/chat/completions"),
            "sonar-pro",
        );
        let out = client
            .search(&SearchRequest::new("q", Recency::Week))
            .await
            .unwrap();
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.sources[0].url, "https://a.example/");
    }

    #[tokio::test]
    async fn non_success_status_is_a_search_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "nope") }),
        );
        let addr = serve(app).await;
        let client = PerplexitySearch::new(
            reqwest::Client::new(),
            "bad",
            format!("http://{addr}/chat/completions"),
            "sonar-pro",
        );
        let err = client
            .search(&SearchRequest::new("q", Recency::Day))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Search(_)), "got {err:?}");
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn timeout_is_a_search_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(1_500)).await;
                Json(serde_json::json!({ "choices": [] }))
            }),
        );
        let addr = serve(app).await;
        let client = PerplexitySearch::new(
            reqwest::Client::new(),
            "k",
            format!("http://{addr}/chat/completions"),
            "sonar-pro",
        )
        .with_timeout(Duration::from_millis(200));
        let err = client
            .search(&SearchRequest::new("q", Recency::Day))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }
}
