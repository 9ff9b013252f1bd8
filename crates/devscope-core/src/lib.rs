use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod text;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("no web sources were returned by the search layer")]
    NoSources,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Default cap on how many sources a search may return.
pub const DEFAULT_MAX_RESULTS: usize = 6;

/// Analysis mode chosen by the user; decides how the search query is phrased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Discover,
    Compare,
    DeepDive,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Discover, Mode::Compare, Mode::DeepDive];

    pub fn label(self) -> &'static str {
        match self {
            Mode::Discover => "Discover tools for a problem",
            Mode::Compare => "Compare tools in a category",
            Mode::DeepDive => "Deep dive on a specific tool",
        }
    }

    fn short_name(self) -> &'static str {
        match self {
            Mode::Discover => "discover",
            Mode::Compare => "compare",
            Mode::DeepDive => "deep-dive",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Mode::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(s) || m.short_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("unknown mode: {s}")))
    }
}

/// Coarse freshness constraint passed through to the search provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    Day,
    #[default]
    Week,
    Month,
    Year,
}

impl Recency {
    pub fn as_str(self) -> &'static str {
        match self {
            Recency::Day => "day",
            Recency::Week => "week",
            Recency::Month => "month",
            Recency::Year => "year",
        }
    }
}

impl fmt::Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Recency::Day),
            "week" => Ok(Recency::Week),
            "month" => Ok(Recency::Month),
            "year" => Ok(Recency::Year),
            other => Err(Error::InvalidInput(format!(
                "unknown recency: {other} (allowed: day, week, month, year)"
            ))),
        }
    }
}

/// How detailed the synthesized briefing should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Depth {
    #[default]
    Concise,
    DeepDive,
}

impl Depth {
    pub fn label(self) -> &'static str {
        match self {
            Depth::Concise => "Concise",
            Depth::DeepDive => "Deep dive",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Depth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concise" => Ok(Depth::Concise),
            "deep dive" | "deep-dive" | "deep" => Ok(Depth::DeepDive),
            other => Err(Error::InvalidInput(format!("unknown depth: {other}"))),
        }
    }
}

/// Soft priority hint naming a dev-focus area. `Any` means no hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Focus {
    #[default]
    Any,
    BackendApis,
    FrontendUi,
    MlopsData,
    DevexCollaboration,
    TestingQa,
}

impl Focus {
    pub const ALL: [Focus; 6] = [
        Focus::Any,
        Focus::BackendApis,
        Focus::FrontendUi,
        Focus::MlopsData,
        Focus::DevexCollaboration,
        Focus::TestingQa,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Focus::Any => "Any",
            Focus::BackendApis => "Backend / APIs",
            Focus::FrontendUi => "Frontend / UI",
            Focus::MlopsData => "MLOps / Data",
            Focus::DevexCollaboration => "DevEx / Collaboration",
            Focus::TestingQa => "Testing / QA",
        }
    }

    fn short_name(self) -> &'static str {
        match self {
            Focus::Any => "any",
            Focus::BackendApis => "backend",
            Focus::FrontendUi => "frontend",
            Focus::MlopsData => "mlops",
            Focus::DevexCollaboration => "devex",
            Focus::TestingQa => "testing",
        }
    }
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Focus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Focus::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(s) || f.short_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("unknown focus: {s}")))
    }
}

/// One retrieved web source. `url` may be empty when the provider omitted it; such
/// entries are skipped by context assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl Source {
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub recency: Recency,
    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, recency: Recency) -> Self {
        Self {
            query: query.into(),
            recency,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub summary: String,
    pub sources: Vec<Source>,
}

/// A labeled excerpt of one source, as fed to the generation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlock {
    /// "S1", "S2", ... numbered over the blocks actually emitted.
    pub label: String,
    pub title: String,
    pub url: String,
    pub body: String,
}

/// Divider line closing every rendered context block.
pub const BLOCK_DIVIDER: &str = "------------------------";

impl ContextBlock {
    pub fn render(&self) -> String {
        format!(
            "[{}] {}\nURL: {}\n\n{}\n{BLOCK_DIVIDER}",
            self.label, self.title, self.url, self.body
        )
    }
}

/// Display-only projection of a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarSource {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub domain: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssembledContext {
    pub context: String,
    pub context_preview: String,
    pub blocks: Vec<ContextBlock>,
    pub sidebar_sources: Vec<SidebarSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BriefingRequest {
    pub query: String,
    pub mode: Mode,
    pub recency: Recency,
    pub focus: Focus,
    pub depth: Depth,
    /// Optional free-text tech stack hint ("Python, FastAPI, ...").
    pub stack: Option<String>,
}

impl BriefingRequest {
    /// Trimmed stack hint, `None` when absent or blank.
    pub fn stack_hint(&self) -> Option<&str> {
        self.stack
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingResult {
    pub answer: String,
    pub search_summary: String,
    pub context_preview: String,
    pub sources: Vec<SidebarSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// Best-effort page text retrieval. Implementations never fail: any transport or parse
/// problem yields an empty string.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str, max_chars: usize) -> String;
}

#[async_trait::async_trait]
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, req: &SearchRequest) -> Result<SearchResult>;
}

#[async_trait::async_trait]
pub trait Completion: Send + Sync {
    fn name(&self) -> &'static str;
    async fn complete(&self, req: &CompletionRequest) -> Result<String>;
}
