//! In-memory history for the interactive `session` command. Nothing is persisted.

/// Characters of the answer kept per history entry.
pub const SUMMARY_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub query: String,
    pub summary: String,
    /// Whether `summary` is a cut-down answer.
    pub truncated: bool,
}

#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn push(&mut self, query: &str, answer: &str) {
        self.entries.push(HistoryEntry {
            query: query.trim().to_string(),
            summary: answer.chars().take(SUMMARY_CHARS).collect(),
            truncated: answer.chars().nth(SUMMARY_CHARS).is_some(),
        });
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "No analyses yet this session.\n".to_string();
        }
        let mut out = String::from("Past analyses this session:\n");
        for (i, h) in self.newest_first().enumerate() {
            let more = if h.truncated { "..." } else { "" };
            out.push_str(&format!("{}. {}\n   {}{more}\n", i + 1, h.query, h.summary));
        }
        out
    }
}
