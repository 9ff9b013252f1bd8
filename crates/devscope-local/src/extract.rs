use devscope_core::text::truncate;

/// Paragraph-level text of an HTML document, in document order.
///
/// Each `<p>` contributes its trimmed text nodes joined by single spaces; empty paragraphs are
/// skipped. Paragraphs are joined with blank lines. Accumulation stops once the running total
/// exceeds `max_chars`, and the joined text is then hard-bounded with [`truncate`].
pub fn paragraph_text(html: &str, max_chars: usize) -> String {
    let doc = html_scraper::Html::parse_document(html);
    let Ok(sel) = html_scraper::Selector::parse("p") else {
        return String::new();
    };

    let mut chunks: Vec<String> = Vec::new();
    let mut total_chars = 0usize;
    for el in doc.select(&sel) {
        let text = el
            .text()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            total_chars += text.chars().count();
            chunks.push(text);
        }
        if total_chars > max_chars {
            break;
        }
    }

    truncate(&chunks.join("\n\n"), max_chars)
}
