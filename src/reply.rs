use std::collections::BTreeSet;

use crate::sections::CategoryTag;

pub const DEFAULT_HEADER: &str = "📚 **KNOWLEDGE BASE**";
pub const SOURCES_LABEL: &str = "**Sources:**";
pub const CITATION_MARKER: &str = "📄";

pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't get an answer right now. Please try again in a moment.";
pub const EMPTY_QUESTION_REPLY: &str =
    "Send me a question and I'll search the knowledge base for you.";

/// Discord rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

pub fn tag_header(tag: CategoryTag) -> String {
    format!("{} **{}**", tag.emoji(), tag.label().to_uppercase())
}

/// Renders an answer as header block, body and (when present) a sources footer.
pub fn build_reply(answer: &str, citations: &[String], tags: &BTreeSet<CategoryTag>) -> String {
    let header = if tags.is_empty() {
        DEFAULT_HEADER.to_string()
    } else {
        tags.iter()
            .map(|tag| tag_header(*tag))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut reply = format!("{header}\n\n{answer}");
    if !citations.is_empty() {
        reply.push_str("\n\n");
        reply.push_str(SOURCES_LABEL);
        for path in citations {
            reply.push('\n');
            reply.push_str(CITATION_MARKER);
            reply.push(' ');
            reply.push_str(path);
        }
    }
    reply
}

/// Splits `text` into pieces of at most `limit` characters, breaking on line
/// boundaries where possible. Joining the pieces with `\n` restores `text`
/// unless a single line had to be cut.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut parts = Vec::new();
    let mut current: Option<String> = None;
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_some() { line_len + 1 } else { line_len };

        if current_len + needed <= limit {
            match current.as_mut() {
                Some(buf) => {
                    buf.push('\n');
                    buf.push_str(line);
                }
                None => current = Some(line.to_string()),
            }
            current_len += needed;
            continue;
        }

        if let Some(done) = current.take() {
            parts.push(done);
            current_len = 0;
        }

        // Over-long single line: cut on char boundaries.
        let chars: Vec<char> = line.chars().collect();
        let mut pieces = chars.chunks(limit).peekable();
        if pieces.peek().is_none() {
            current = Some(String::new());
        }
        while let Some(piece) = pieces.next() {
            if pieces.peek().is_some() {
                parts.push(piece.iter().collect());
            } else {
                current_len = piece.len();
                current = Some(piece.iter().collect());
            }
        }
    }

    parts.extend(current);
    parts
}
