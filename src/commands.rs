//! `@stats` and `@audit`: knowledge-base introspection commands.

use std::collections::BTreeSet;

use crate::error::Error;
use crate::schema::DocumentStats;
use crate::sync_state::SyncState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Expected document counts from the local sync state.
    Stats,
    /// Expected counts compared with a live query of the store.
    Audit,
}

impl Command {
    /// Recognizes a command as the first whitespace-delimited token.
    pub fn detect(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        if token.eq_ignore_ascii_case("@stats") {
            Some(Command::Stats)
        } else if token.eq_ignore_ascii_case("@audit") {
            Some(Command::Audit)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Stats => "stats",
            Command::Audit => "audit",
        }
    }
}

pub fn sync_state_failure(err: &Error) -> String {
    format!("⚠️ Could not read the local sync state: {err}")
}

pub fn live_store_failure(err: &Error) -> String {
    format!("⚠️ Could not query the live document store: {err}")
}

pub fn render_stats(state: &SyncState) -> String {
    let stats = state.document_stats();
    let mut out = String::from("📊 **Expected documents**");
    if let Some(at) = state.synced_at {
        out.push_str(&format!(" (last sync {})", at.format("%Y-%m-%d %H:%M UTC")));
    }

    if stats.counts.is_empty() {
        out.push_str("\nNo documents recorded in the sync state.");
        return out;
    }
    for (category, count) in &stats.counts {
        out.push_str(&format!("\n• {category}: {count}"));
    }
    out.push_str(&format!("\n**Total:** {}", stats.total()));
    out
}

pub fn render_audit(expected: &DocumentStats, actual: &DocumentStats) -> String {
    let categories: BTreeSet<&String> = expected.counts.keys().chain(actual.counts.keys()).collect();

    let mut out = String::from("🔎 **Document audit** (expected / live)");
    for category in categories {
        let want = expected.get(category);
        let have = actual.get(category);
        let mark = if want == have { "✅" } else { "⚠️" };
        out.push_str(&format!("\n{mark} {category}: {want} / {have}"));
    }

    let (want, have) = (expected.total(), actual.total());
    let mark = if want == have { "✅" } else { "⚠️" };
    out.push_str(&format!("\n{mark} **Total:** {want} / {have}"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_state::SyncedDocument;

    fn stats(pairs: &[(&str, usize)]) -> DocumentStats {
        DocumentStats {
            counts: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn detects_commands_case_insensitively() {
        assert_eq!(Command::detect("@stats"), Some(Command::Stats));
        assert_eq!(Command::detect("  @AUDIT please\nthanks"), Some(Command::Audit));
        assert_eq!(Command::detect("@statsplease"), None);
        assert_eq!(Command::detect("show @stats"), None);
        assert_eq!(Command::detect(""), None);
    }

    #[test]
    fn stats_lists_categories_and_total() {
        let mut state = SyncState::default();
        for (path, section) in [("a.md", "devrel"), ("b.md", "devrel"), ("c.md", "support")] {
            state.documents.insert(
                path.into(),
                SyncedDocument { section: Some(section.into()), document_name: None },
            );
        }

        let out = render_stats(&state);
        assert_eq!(out, "📊 **Expected documents**\n• devrel: 2\n• support: 1\n**Total:** 3");
    }

    #[test]
    fn stats_on_empty_state() {
        let out = render_stats(&SyncState::default());
        assert!(out.ends_with("No documents recorded in the sync state."));
    }

    #[test]
    fn audit_flags_mismatched_categories() {
        let expected = stats(&[("devrel", 2), ("support", 1)]);
        let actual = stats(&[("devrel", 2), ("people", 4)]);

        let out = render_audit(&expected, &actual);
        assert_eq!(
            out,
            "🔎 **Document audit** (expected / live)\n\
             ✅ devrel: 2 / 2\n\
             ⚠️ people: 0 / 4\n\
             ⚠️ support: 1 / 0\n\
             ⚠️ **Total:** 3 / 6"
        );
    }
}
