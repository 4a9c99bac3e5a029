//! Category tags that narrow a question to one part of the knowledge base.
//!
//! Two prefix forms are recognized at the start of a question:
//!
//! ```text
//! devrel: how do we publish release notes?
//! devrel, support: who owns the refunds checklist?
//! #ops #people what is the on-call handover?
//! ```
//!
//! A colon label is all-or-nothing: if any token before the colon is not a
//! known tag, the whole text is treated as the question.

use std::collections::BTreeSet;
use std::fmt;

/// Metadata key the sync job stores the category under.
pub const SECTION_METADATA_KEY: &str = "section";

const MAX_LABEL_TOKENS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CategoryTag {
    Devrel,
    Operations,
    Support,
    Engineering,
    Product,
    People,
}

impl CategoryTag {
    pub const ALL: [CategoryTag; 6] = [
        CategoryTag::Devrel,
        CategoryTag::Operations,
        CategoryTag::Support,
        CategoryTag::Engineering,
        CategoryTag::Product,
        CategoryTag::People,
    ];

    /// Value stored in document metadata and used in search filters.
    pub fn label(self) -> &'static str {
        match self {
            CategoryTag::Devrel => "devrel",
            CategoryTag::Operations => "operations",
            CategoryTag::Support => "support",
            CategoryTag::Engineering => "engineering",
            CategoryTag::Product => "product",
            CategoryTag::People => "people",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            CategoryTag::Devrel => "🥑",
            CategoryTag::Operations => "⚙️",
            CategoryTag::Support => "🛟",
            CategoryTag::Engineering => "🛠️",
            CategoryTag::Product => "📦",
            CategoryTag::People => "👥",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            CategoryTag::Devrel => &["devrels", "developer-relations"],
            CategoryTag::Operations => &["ops"],
            CategoryTag::Support => &["helpdesk"],
            CategoryTag::Engineering => &["eng"],
            CategoryTag::Product => &["prod"],
            CategoryTag::People => &["hr"],
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|tag| tag.label() == needle || tag.aliases().iter().any(|alias| *alias == needle))
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Splits leading category labels off `text`.
///
/// Returns the question with the label segment removed and the recognized
/// tags. When no label is recognized the text comes back unchanged.
pub fn parse_sections(text: &str) -> (String, BTreeSet<CategoryTag>) {
    if let Some(parsed) = parse_colon_label(text).or_else(|| parse_hashtags(text)) {
        return parsed;
    }
    (text.to_string(), BTreeSet::new())
}

fn parse_colon_label(text: &str) -> Option<(String, BTreeSet<CategoryTag>)> {
    let (label, rest) = text.split_once(':')?;
    let tokens: Vec<&str> = label
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() || tokens.len() > MAX_LABEL_TOKENS {
        return None;
    }

    let tags = tokens
        .into_iter()
        .map(CategoryTag::from_label)
        .collect::<Option<BTreeSet<_>>>()?;
    Some((rest.trim().to_string(), tags))
}

fn parse_hashtags(text: &str) -> Option<(String, BTreeSet<CategoryTag>)> {
    let mut tags = BTreeSet::new();
    let mut rest = text.trim_start();

    loop {
        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..token_end];
        let Some(tag) = token.strip_prefix('#').and_then(CategoryTag::from_label) else {
            break;
        };
        tags.insert(tag);
        rest = rest[token_end..].trim_start();
    }

    if tags.is_empty() {
        return None;
    }
    Some((rest.trim().to_string(), tags))
}

/// Renders the search filter for `tags`, e.g. `section="devrel" OR section="support"`.
pub fn metadata_filter(tags: &BTreeSet<CategoryTag>) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let clauses: Vec<String> = tags
        .iter()
        .map(|tag| format!("{SECTION_METADATA_KEY}=\"{}\"", tag.label()))
        .collect();
    Some(clauses.join(" OR "))
}
