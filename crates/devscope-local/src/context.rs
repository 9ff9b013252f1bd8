//! Context assembly: turn retrieved sources into labeled, bounded prompt context plus a
//! display-oriented source list.

use crate::DEFAULT_PAGE_MAX_CHARS;
use devscope_core::text::{domain_of, truncate};
use devscope_core::{AssembledContext, ContextBlock, PageFetcher, SidebarSource, Source};
use futures_util::StreamExt;

pub const PER_SOURCE_MAX_CHARS: usize = 2_000;
pub const CONTEXT_PREVIEW_MAX_CHARS: usize = 4_000;
pub const SIDEBAR_SNIPPET_MAX_CHARS: usize = 260;

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// Budget passed to the page fetcher for each source.
    pub page_max_chars: usize,
    pub per_source_max_chars: usize,
    pub preview_max_chars: usize,
    pub snippet_max_chars: usize,
    /// Pages fetched at once. Block order follows source order regardless.
    pub fetch_concurrency: usize,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            page_max_chars: DEFAULT_PAGE_MAX_CHARS,
            per_source_max_chars: PER_SOURCE_MAX_CHARS,
            preview_max_chars: CONTEXT_PREVIEW_MAX_CHARS,
            snippet_max_chars: SIDEBAR_SNIPPET_MAX_CHARS,
            fetch_concurrency: 1,
        }
    }
}

/// Build the labeled context for `sources`.
///
/// Sources without a url are dropped before labeling, so labels `S1..Sk` are contiguous over
/// the blocks actually emitted. A page that yields no text falls back to the source snippet.
pub async fn assemble(
    fetcher: &dyn PageFetcher,
    sources: &[Source],
    opts: &AssembleOptions,
) -> AssembledContext {
    let retained: Vec<&Source> = sources.iter().filter(|s| s.has_url()).collect();
    if retained.len() < sources.len() {
        tracing::debug!(
            skipped = sources.len() - retained.len(),
            "skipping sources without a url"
        );
    }

    let pages: Vec<String> = futures_util::stream::iter(
        retained
            .iter()
            .map(|s| fetcher.fetch_text(s.url.trim(), opts.page_max_chars)),
    )
    .buffered(opts.fetch_concurrency.max(1))
    .collect()
    .await;

    let mut blocks = Vec::with_capacity(retained.len());
    let mut sidebar_sources = Vec::with_capacity(retained.len());
    for (i, (src, page)) in retained.into_iter().zip(pages).enumerate() {
        let n = i + 1;
        let url = src.url.trim().to_string();
        let title = src
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Source {n}"));
        let snippet = src.snippet.as_deref().unwrap_or_default();

        let raw_body = if page.is_empty() { snippet } else { page.as_str() };
        let body = truncate(raw_body, opts.per_source_max_chars);

        let sidebar_text = if snippet.is_empty() { body.as_str() } else { snippet };
        sidebar_sources.push(SidebarSource {
            title: title.clone(),
            url: url.clone(),
            snippet: truncate(sidebar_text, opts.snippet_max_chars),
            domain: domain_of(&url),
        });
        blocks.push(ContextBlock {
            label: format!("S{n}"),
            title,
            url,
            body,
        });
    }

    let context = blocks
        .iter()
        .map(ContextBlock::render)
        .collect::<Vec<_>>()
        .join("\n\n");
    let context_preview = truncate(&context, opts.preview_max_chars);

    AssembledContext {
        context,
        context_preview,
        blocks,
        sidebar_sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MapFetcher {
        pages: HashMap<String, String>,
        /// Per-url delay, to scramble completion order under concurrency.
        delays_ms: HashMap<String, u64>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch_text(&self, url: &str, _max_chars: usize) -> String {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(ms) = self.delays_ms.get(url) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            self.pages.get(url).cloned().unwrap_or_default()
        }
    }

    fn src(title: Option<&str>, url: &str, snippet: Option<&str>) -> Source {
        Source {
            title: title.map(str::to_string),
            url: url.to_string(),
            snippet: snippet.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn skipped_sources_do_not_consume_labels() {
        let f = MapFetcher::default();
        let sources = vec![
            src(Some("A"), "https://a.example/", Some("sa")),
            src(Some("no url"), "", Some("x")),
            src(Some("B"), "https://b.example/", Some("sb")),
            src(None, "   ", None),
            src(Some("C"), "https://c.example/", Some("sc")),
        ];
        let out = assemble(&f, &sources, &AssembleOptions::default()).await;

        let labels: Vec<_> = out.blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["S1", "S2", "S3"]);
        assert_eq!(out.blocks[1].title, "B");
        assert_eq!(out.sidebar_sources.len(), 3);
        assert!(out.sidebar_sources.iter().all(|s| !s.url.is_empty()));
        assert!(!out.context.contains("no url"));
        assert_eq!(f.calls.lock().unwrap().len(), 3, "no fetch for url-less sources");
    }

    #[tokio::test]
    async fn fetched_text_is_preferred_and_snippet_is_the_fallback() {
        let mut f = MapFetcher::default();
        f.pages
            .insert("https://a.example/".to_string(), "page text".to_string());
        let sources = vec![
            src(Some("A"), "https://a.example/", Some("snippet a")),
            src(Some("B"), "https://b.example/", Some("snippet b")),
            src(Some("C"), "https://c.example/", None),
        ];
        let out = assemble(&f, &sources, &AssembleOptions::default()).await;
        assert_eq!(out.blocks[0].body, "page text");
        assert_eq!(out.blocks[1].body, "snippet b");
        assert_eq!(out.blocks[2].body, "");

        // Sidebar prefers the search snippet, then the body.
        assert_eq!(out.sidebar_sources[0].snippet, "snippet a");
        assert_eq!(out.sidebar_sources[2].snippet, "");
        assert_eq!(out.sidebar_sources[0].domain, "a.example");
    }

    #[tokio::test]
    async fn missing_titles_get_a_numbered_default() {
        let f = MapFetcher::default();
        let sources = vec![
            src(None, "", None),
            src(Some("  "), "https://a.example/", None),
        ];
        let out = assemble(&f, &sources, &AssembleOptions::default()).await;
        assert_eq!(out.blocks[0].title, "Source 1");
        assert_eq!(out.sidebar_sources[0].title, "Source 1");
    }

    #[tokio::test]
    async fn bodies_preview_and_snippets_are_bounded() {
        let mut f = MapFetcher::default();
        let long = "lorem ipsum ".repeat(1_000);
        let sources: Vec<Source> = (0..6)
            .map(|i| {
                let url = format!("https://e{i}.example/");
                f.pages.insert(url.clone(), long.clone());
                src(Some("T"), &url, None)
            })
            .collect();
        let out = assemble(&f, &sources, &AssembleOptions::default()).await;

        for b in &out.blocks {
            assert!(b.body.chars().count() <= PER_SOURCE_MAX_CHARS);
        }
        for s in &out.sidebar_sources {
            assert!(s.snippet.chars().count() <= SIDEBAR_SNIPPET_MAX_CHARS);
        }
        assert!(out.context.chars().count() > CONTEXT_PREVIEW_MAX_CHARS);
        assert!(out.context_preview.chars().count() <= CONTEXT_PREVIEW_MAX_CHARS);
        assert!(out.context.starts_with(out.context_preview.trim_end_matches('…')));
    }

    #[tokio::test]
    async fn context_joins_rendered_blocks() {
        let mut f = MapFetcher::default();
        f.pages.insert("https://a.example/".to_string(), "aaa".to_string());
        f.pages.insert("https://b.example/".to_string(), "bbb".to_string());
        let sources = vec![
            src(Some("A"), "https://a.example/", None),
            src(Some("B"), "https://b.example/", None),
        ];
        let out = assemble(&f, &sources, &AssembleOptions::default()).await;
        assert_eq!(
            out.context,
            "[S1] A\nURL: https://a.example/\n\naaa\n------------------------\n\n\
             [S2] B\nURL: https://b.example/\n\nbbb\n------------------------"
        );
        assert_eq!(out.context_preview, out.context);
    }

    #[tokio::test]
    async fn concurrent_fetches_keep_source_order() {
        let mut f = MapFetcher::default();
        let sources: Vec<Source> = (0..4)
            .map(|i| {
                let url = format!("https://e{i}.example/");
                f.pages.insert(url.clone(), format!("body {i}"));
                // Earlier sources finish last.
                f.delays_ms.insert(url.clone(), 40 - 10 * i as u64);
                src(Some(format!("T{i}").as_str()), &url, None)
            })
            .collect();
        let opts = AssembleOptions {
            fetch_concurrency: 4,
            ..Default::default()
        };
        let out = assemble(&f, &sources, &opts).await;
        let bodies: Vec<_> = out.blocks.iter().map(|b| b.body.as_str()).collect();
        assert_eq!(bodies, vec!["body 0", "body 1", "body 2", "body 3"]);
    }

    #[tokio::test]
    async fn no_sources_means_empty_context() {
        let out = assemble(&MapFetcher::default(), &[], &AssembleOptions::default()).await;
        assert!(out.context.is_empty());
        assert!(out.blocks.is_empty());
        assert!(out.sidebar_sources.is_empty());
    }
}
