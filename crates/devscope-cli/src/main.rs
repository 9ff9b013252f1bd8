use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devscope_core::{
    BriefingRequest, BriefingResult, Depth, Focus, Mode, PageFetcher, Recency, SearchRequest,
    WebSearch, DEFAULT_MAX_RESULTS,
};
use devscope_local::briefing::BriefingGenerator;
use devscope_local::config::{Config, OPENAI_API_KEY, PERPLEXITY_API_KEY};
use devscope_local::context::AssembleOptions;
use devscope_local::perplexity::PerplexitySearch;
use devscope_local::{http_client, LocalFetcher, PageCache, DEFAULT_PAGE_MAX_CHARS};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

mod envfile;
mod session;

#[derive(Parser, Debug)]
#[command(name = "devscope")]
#[command(about = "Developer-tooling briefings from live web sources", long_about = None)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search, fetch sources and synthesize a tooling briefing.
    Brief(BriefCmd),
    /// Run only the web search step (json).
    Search(SearchCmd),
    /// Fetch one page and print its extracted paragraph text.
    Fetch(FetchCmd),
    /// Interactive loop: one query per stdin line, with in-memory history (`:history`).
    Session(SessionCmd),
    /// Diagnose configuration (json; no secrets, no network).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug, Clone)]
struct BriefingOpts {
    /// Analysis mode: discover, compare, deep-dive (or the full label).
    #[arg(long, default_value = "discover")]
    mode: Mode,
    /// Web recency filter: day, week, month, year.
    #[arg(long, default_value = "week")]
    recency: Recency,
    /// Dev focus area, used as a soft hint: any, backend, frontend, mlops, devex, testing.
    #[arg(long, default_value = "any")]
    focus: Focus,
    /// Answer depth: concise, deep-dive.
    #[arg(long, default_value = "concise")]
    depth: Depth,
    /// Your tech stack (optional), e.g. "Python, FastAPI, React".
    #[arg(long)]
    stack: Option<String>,
    /// Pages fetched at once while assembling context.
    #[arg(long, default_value_t = 1)]
    fetch_concurrency: usize,
}

#[derive(clap::Args, Debug)]
struct BriefCmd {
    /// What dev productivity problem or tool are you exploring?
    #[arg(long)]
    query: String,
    #[command(flatten)]
    opts: BriefingOpts,
    /// Also print the context preview fed to the model (text output only).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    show_context: bool,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    #[arg(long)]
    query: String,
    #[arg(long, default_value = "week")]
    recency: Recency,
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    max_results: usize,
}

#[derive(clap::Args, Debug)]
struct FetchCmd {
    url: String,
    #[arg(long, default_value_t = DEFAULT_PAGE_MAX_CHARS)]
    max_chars: usize,
}

#[derive(clap::Args, Debug)]
struct SessionCmd {
    #[command(flatten)]
    opts: BriefingOpts,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // Stdout carries command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Print setup instructions and exit before any pipeline work.
fn exit_not_configured(message: &str) -> ! {
    eprintln!(
        "Configuration error: {message}\n\n\
         Please create a `.env` file (or export variables) with valid `{OPENAI_API_KEY}` and \
         `{PERPLEXITY_API_KEY}`.\nRun `devscope doctor` to see what is configured."
    );
    std::process::exit(2);
}

fn briefing_request(query: &str, opts: &BriefingOpts) -> BriefingRequest {
    BriefingRequest {
        query: query.to_string(),
        mode: opts.mode,
        recency: opts.recency,
        focus: opts.focus,
        depth: opts.depth,
        stack: opts.stack.clone(),
    }
}

fn generator(cfg: &Config, opts: &BriefingOpts) -> Result<BriefingGenerator> {
    let check = cfg.check();
    if !check.ok() {
        exit_not_configured(&check.message());
    }
    Ok(BriefingGenerator::from_config(cfg)?.with_assemble_options(AssembleOptions {
        fetch_concurrency: opts.fetch_concurrency.max(1),
        ..Default::default()
    }))
}

fn render_text(result: &BriefingResult, show_context: bool) -> String {
    let mut out = String::new();
    out.push_str(result.answer.trim_end());
    out.push_str("\n\n---\n");
    if !result.search_summary.trim().is_empty() {
        out.push_str("Web research summary (pre-synthesis):\n");
        out.push_str(result.search_summary.trim_end());
        out.push_str("\n\n");
    }
    out.push_str("Sources used:\n");
    for (i, s) in result.sources.iter().enumerate() {
        let title = if s.title.is_empty() { "[untitled]" } else { s.title.as_str() };
        out.push_str(&format!("[S{}] {title}", i + 1));
        if !s.domain.is_empty() {
            out.push_str(&format!(" ({})", s.domain));
        }
        out.push_str(&format!("\n     {}\n", s.url));
        if !s.snippet.is_empty() {
            out.push_str(&format!("     {}\n", s.snippet.replace('\n', " ")));
        }
    }
    if show_context {
        out.push_str("\nRaw context used (preview):\n");
        out.push_str(&result.context_preview);
        out.push('\n');
    }
    out
}

async fn run_session(cfg: &Config, args: SessionCmd) -> Result<()> {
    let generator = generator(cfg, &args.opts)?;
    let mut history = session::History::default();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    eprintln!("Enter a question per line (`:history` to list past analyses, `:quit` to exit).");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":history" => {
                print!("{}", history.render());
                continue;
            }
            _ => {}
        }
        match generator
            .generate(&briefing_request(line, &args.opts))
            .await
        {
            Ok(result) => {
                history.push(line, &result.answer);
                println!("{}", render_text(&result, false));
            }
            // One failed run should not end the session.
            Err(e) => eprintln!("Something went wrong while generating the briefing: {e}"),
        }
    }
    Ok(())
}

fn doctor_json(cfg: &Config, elapsed_ms: u128) -> serde_json::Value {
    let check = cfg.check();
    serde_json::json!({
        "schema_version": 1,
        "name": "devscope",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": elapsed_ms,
        "ok": check.ok(),
        "missing": check.missing,
        "message": check.message(),
        "configured": {
            "search": { "perplexity": cfg.perplexity_api_key.is_some() },
            "llm": { "openai": cfg.openai_api_key.is_some() },
            "perplexity_endpoint": cfg.perplexity_endpoint,
            "openai_base_url": cfg.openai_base_url,
            "search_model": cfg.search_model,
            "openai_model": cfg.openai_model,
            "page_cache": {
                "capacity": cfg.page_cache_capacity,
                "ttl_s": cfg.page_cache_ttl.map(|d| d.as_secs()),
            },
        },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Some(p) = envfile::env_file_path() {
        envfile::load(&p);
    }

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = Config::from_env();
    tracing::debug!(config = ?cfg, "configuration loaded");

    match cli.command {
        Commands::Brief(args) => {
            let generator = generator(&cfg, &args.opts)?;
            let result = generator
                .generate(&briefing_request(&args.query, &args.opts))
                .await
                .context("something went wrong while generating the briefing")?;
            match args.output.trim().to_ascii_lowercase().as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&result)?),
                _ => print!("{}", render_text(&result, args.show_context)),
            }
        }
        Commands::Search(args) => {
            if cfg.perplexity_api_key.is_none() {
                exit_not_configured(&format!("Missing environment variables: {PERPLEXITY_API_KEY}"));
            }
            let search = PerplexitySearch::from_config(http_client()?, &cfg)?;
            let req = SearchRequest {
                query: args.query,
                recency: args.recency,
                max_results: args.max_results,
            };
            let result = search.search(&req).await.context("web search failed")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Fetch(args) => {
            let cache = PageCache::new(cfg.page_cache_capacity).with_ttl(cfg.page_cache_ttl);
            let fetcher = LocalFetcher::new(http_client()?, Arc::new(cache));
            let text = fetcher.fetch_text(&args.url, args.max_chars).await;
            println!("{text}");
        }
        Commands::Session(args) => run_session(&cfg, args).await?,
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();
            let v = doctor_json(&cfg, t0.elapsed().as_millis());
            match args.output.trim().to_ascii_lowercase().as_str() {
                "text" => {
                    let check = cfg.check();
                    println!(
                        "perplexity: {}\nopenai: {}\n{}",
                        if cfg.perplexity_api_key.is_some() { "configured" } else { "missing" },
                        if cfg.openai_api_key.is_some() { "configured" } else { "missing" },
                        if check.ok() { "ok".to_string() } else { check.message() },
                    );
                }
                _ => println!("{}", serde_json::to_string_pretty(&v)?),
            }
        }
        Commands::Version(args) => match args.output.trim().to_ascii_lowercase().as_str() {
            "text" => println!("devscope {}", env!("CARGO_PKG_VERSION")),
            _ => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "name": "devscope",
                    "version": env!("CARGO_PKG_VERSION"),
                }))?
            ),
        },
    }
    Ok(())
}
