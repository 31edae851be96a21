//! Context assembly from ranked candidates.

use tessera_core::{Context, ScoredCandidate};

/// Appended to any item that was cut short.
pub const TRUNCATION_MARKER: &str = "...";

/// Truncates and joins ranked candidates into a [`Context`].
///
/// # Examples
///
/// ```
/// use tessera_core::ScoredCandidate;
/// use tessera_retrieval::context::ContextAssembler;
///
/// let ranked = vec![
///     ScoredCandidate { title: None, text: "abcdefgh".into(), score: 0.9 },
///     ScoredCandidate { title: None, text: "xyz".into(), score: 0.5 },
/// ];
/// let context = ContextAssembler::new(4, " | ").assemble(&ranked);
/// assert_eq!(context.render(), "abcd... | xyz");
/// ```
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    item_chars: usize,
    separator: String,
    budget_chars: Option<usize>,
}

impl ContextAssembler {
    /// Cap each item at `item_chars` characters and join with `separator`.
    pub fn new(item_chars: usize, separator: impl Into<String>) -> Self {
        Self {
            item_chars,
            separator: separator.into(),
            budget_chars: None,
        }
    }

    /// Also cap the rendered context at `budget` characters overall.
    ///
    /// Items that do not fit are cut (with the marker) or dropped; separators
    /// count against the budget.
    pub fn with_budget(mut self, budget: Option<usize>) -> Self {
        self.budget_chars = budget;
        self
    }

    /// Build the context for `ranked`, preserving its order.
    pub fn assemble(&self, ranked: &[ScoredCandidate]) -> Context {
        let sep_len = self.separator.chars().count();
        let mut used = 0usize;
        let mut items = Vec::with_capacity(ranked.len());

        for candidate in ranked {
            let mut item = truncate_chars(&candidate.text, self.item_chars);

            if let Some(budget) = self.budget_chars {
                let overhead = if items.is_empty() { 0 } else { sep_len };
                let remaining = budget.saturating_sub(used + overhead);
                let item_len = item.chars().count();
                if item_len > remaining {
                    // Keep a partial item only if some real content survives.
                    let room = remaining.saturating_sub(TRUNCATION_MARKER.chars().count());
                    if room == 0 {
                        break;
                    }
                    item = truncate_chars(&candidate.text, room.min(self.item_chars));
                }
                used += overhead + item.chars().count();
            }

            items.push(item);
        }

        Context::new(items, self.separator.clone())
    }
}

/// Cut `text` to at most `max_chars` characters, appending the marker if cut.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::context::truncate_chars;
///
/// assert_eq!(truncate_chars("héllo world", 5), "héllo...");
/// assert_eq!(truncate_chars("short", 10), "short");
/// ```
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}
