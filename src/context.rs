//! Bounded prompt context: a trailing slice of the document text followed by
//! the most recent exchanges.

use crate::db::models::ChatTurn;
use crate::doc_processor::ExtractedContent;

pub const DEFAULT_MAX_TURNS: usize = 5;
pub const DEFAULT_MAX_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    max_turns: usize,
    max_chars: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS, DEFAULT_MAX_CHARS)
    }
}

impl ContextBuilder {
    pub fn new(max_turns: usize, max_chars: usize) -> Self {
        Self {
            max_turns,
            max_chars,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// `<trailing text>\n\n<User:/Bot: lines>`. Older turns are dropped, not
    /// summarized. Tables and images contribute no text.
    pub fn build(&self, content: &ExtractedContent, history: &[ChatTurn]) -> String {
        let text = trailing_chars(content.text(), self.max_chars);
        let start = history.len().saturating_sub(self.max_turns);
        let history_context = history[start..]
            .iter()
            .map(|t| format!("User: {}\nBot: {}", t.query, t.response))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n\n{}", text, history_context)
    }
}

/// The last `n` characters of `text`, never splitting a character.
fn trailing_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    fn turn(i: usize) -> ChatTurn {
        ChatTurn {
            id: format!("t{}", i),
            document: "doc.txt".into(),
            query: format!("q{}", i),
            response: format!("r{}", i),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_empty_history_and_short_text() {
        let content = ExtractedContent::Text("hello".into());
        assert_eq!(ContextBuilder::default().build(&content, &[]), "hello\n\n");
    }

    #[test]
    fn test_keeps_only_last_five_turns() {
        let content = ExtractedContent::Text(String::new());
        let history: Vec<ChatTurn> = (0..8).map(turn).collect();
        let ctx = ContextBuilder::default().build(&content, &history);

        assert_eq!(
            ctx,
            "\n\nUser: q3\nBot: r3\nUser: q4\nBot: r4\nUser: q5\nBot: r5\nUser: q6\nBot: r6\nUser: q7\nBot: r7"
        );
        assert!(!ctx.contains("q2"));
    }

    #[test]
    fn test_keeps_only_trailing_thousand_chars() {
        let text = format!("{}{}", "a".repeat(500), "b".repeat(1000));
        let content = ExtractedContent::Text(text);
        let ctx = ContextBuilder::default().build(&content, &[]);
        assert_eq!(ctx, format!("{}\n\n", "b".repeat(1000)));
    }

    #[test]
    fn test_bounds_hold_for_many_lengths() {
        let builder = ContextBuilder::default();
        for len in [0usize, 1, 999, 1000, 1001, 5000] {
            for turns in [0usize, 1, 4, 5, 6, 20] {
                let content = ExtractedContent::Text("x".repeat(len));
                let history: Vec<ChatTurn> = (0..turns).map(turn).collect();
                let ctx = builder.build(&content, &history);
                let (text, hist) = ctx.split_once("\n\n").unwrap();
                assert_eq!(text.chars().count(), len.min(1000));
                assert_eq!(hist.matches("User: ").count(), turns.min(5));
            }
        }
    }

    #[test]
    fn test_multibyte_text_is_not_split() {
        let content = ExtractedContent::Text("ééééé".into());
        let ctx = ContextBuilder::new(5, 3).build(&content, &[]);
        assert_eq!(ctx, "ééé\n\n");
    }

    #[test]
    fn test_table_contributes_no_text() {
        let content = ExtractedContent::Table(Table::from_csv(b"a\n1\n").unwrap());
        let ctx = ContextBuilder::default().build(&content, &[turn(1)]);
        assert_eq!(ctx, "\n\nUser: q1\nBot: r1");
    }
}
