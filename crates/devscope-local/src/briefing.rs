//! End-to-end briefing: search, assemble context, synthesize.

use crate::config::Config;
use crate::context::{assemble, AssembleOptions};
use crate::openai::OpenAiClient;
use crate::perplexity::PerplexitySearch;
use crate::{http_client, LocalFetcher, PageCache};
use devscope_core::{
    BriefingRequest, BriefingResult, Completion, CompletionRequest, Depth, Error, Focus, Mode,
    PageFetcher, Result, SearchRequest, Source, WebSearch, DEFAULT_MAX_RESULTS,
};
use std::sync::Arc;
use std::time::Instant;

pub const GENERATION_TEMPERATURE: f64 = 0.15;
pub const GENERATION_MAX_TOKENS: u64 = 1_400;

pub fn build_search_query(mode: Mode, query: &str, stack: Option<&str>) -> String {
    let mut q = match mode {
        Mode::Discover => format!("Developer productivity tools to help with: {query}"),
        Mode::Compare => format!("Compare popular developer tools in this category: {query}"),
        Mode::DeepDive => {
            format!("Deep dive on developer tool: {query} (use cases, pros/cons, ecosystem)")
        }
    };
    if let Some(stack) = stack.map(str::trim).filter(|s| !s.is_empty()) {
        q.push_str(&format!(" for a stack that includes: {stack}"));
    }
    q
}

pub fn build_system_prompt(depth: Depth, focus: Focus) -> String {
    let depth_text = match depth {
        Depth::Concise => {
            "Provide a concise but actionable briefing, focusing on the most impactful tools."
        }
        Depth::DeepDive => {
            "Provide a deep, structured briefing with nuanced analysis, trade-offs, and adoption tips."
        }
    };
    let focus_text = match focus {
        Focus::Any => String::new(),
        other => format!(
            " Prioritize tools and practices related to {} when they appear in the context.",
            other.label()
        ),
    };

    format!(
        "You are DevToolScope, a senior engineer and dev productivity expert. \
         You answer based ONLY on the provided web context, labeled as [S1], [S2], etc. \
         If something is not supported by the context, say that it is not clearly covered. \
         {depth_text}{focus_text} \
         Structure your answer with the following sections:\n\
         1. Summary\n\
         2. Recommended tools & platforms\n\
         3. How to adopt them (step-by-step)\n\
         4. Trade-offs & caveats\n\
         5. Confidence & limitations\n\n\
         When you mention a specific tool, reference supporting sources in brackets like [S1], [S2]."
    )
}

pub fn stack_suffix(stack: Option<&str>) -> String {
    match stack.map(str::trim).filter(|s| !s.is_empty()) {
        Some(stack) => format!(
            "\n\nThe user also described their tech stack as:\n{stack}\n\
             Tailor recommendations and caveats to this stack where relevant."
        ),
        None => String::new(),
    }
}

pub fn build_user_message(query: &str, context: &str, stack: Option<&str>) -> String {
    format!(
        "User question:\n{query}\n\nWeb research context:\n{context}\n{}",
        stack_suffix(stack)
    )
}

pub struct BriefingGenerator {
    search: Arc<dyn WebSearch>,
    fetcher: Arc<dyn PageFetcher>,
    completion: Arc<dyn Completion>,
    assemble: AssembleOptions,
    max_results: usize,
}

impl BriefingGenerator {
    pub fn new(
        search: Arc<dyn WebSearch>,
        fetcher: Arc<dyn PageFetcher>,
        completion: Arc<dyn Completion>,
    ) -> Self {
        Self {
            search,
            fetcher,
            completion,
            assemble: AssembleOptions::default(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Wire the production backends. Fails with [`Error::NotConfigured`] before any network
    /// work when a credential is missing.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        cfg.require_credentials()?;
        let client = http_client()?;
        let cache = PageCache::new(cfg.page_cache_capacity).with_ttl(cfg.page_cache_ttl);
        let fetcher = LocalFetcher::new(client.clone(), Arc::new(cache));
        let search = PerplexitySearch::from_config(client.clone(), cfg)?;
        let completion = OpenAiClient::from_config(client, cfg)?;
        Ok(Self::new(
            Arc::new(search),
            Arc::new(fetcher),
            Arc::new(completion),
        ))
    }

    pub fn with_assemble_options(mut self, opts: AssembleOptions) -> Self {
        self.assemble = opts;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub async fn generate(&self, req: &BriefingRequest) -> Result<BriefingResult> {
        let query = req.query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput(
                "Please enter a question or topic first.".to_string(),
            ));
        }
        let stack = req.stack_hint();
        let t0 = Instant::now();

        let search_query = build_search_query(req.mode, query, stack);
        let search_req = SearchRequest {
            query: search_query,
            recency: req.recency,
            max_results: self.max_results,
        };
        let research = self.search.search(&search_req).await?;
        // Url-less entries are dropped by assembly, so they do not count as grounding.
        if !research.sources.iter().any(Source::has_url) {
            return Err(Error::NoSources);
        }

        let ctx = assemble(self.fetcher.as_ref(), &research.sources, &self.assemble).await;
        tracing::info!(
            sources = research.sources.len(),
            retained = ctx.blocks.len(),
            context_chars = ctx.context.chars().count(),
            "context assembled"
        );

        let completion_req = CompletionRequest {
            system: build_system_prompt(req.depth, req.focus),
            user: build_user_message(query, &ctx.context, stack),
            temperature: GENERATION_TEMPERATURE,
            max_tokens: GENERATION_MAX_TOKENS,
        };
        let answer = self.completion.complete(&completion_req).await?;
        tracing::info!(
            provider = self.completion.name(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "briefing generated"
        );

        Ok(BriefingResult {
            answer,
            search_summary: research.summary,
            context_preview: ctx.context_preview,
            sources: ctx.sidebar_sources,
        })
    }
}
