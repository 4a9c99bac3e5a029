//! Expected document counts, read from the state file the KB sync job writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::DocumentStats;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub documents: BTreeMap<String, SyncedDocument>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncedDocument {
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
}

impl SyncState {
    pub fn document_stats(&self) -> DocumentStats {
        let mut stats = DocumentStats::default();
        for doc in self.documents.values() {
            stats.record(doc.section.as_deref());
        }
        stats
    }
}

#[derive(Debug, Clone)]
pub struct SyncStateFile {
    path: PathBuf,
}

impl SyncStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<SyncState> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|source| {
            Error::SyncStateUnavailable {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        let state: SyncState = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), documents = state.documents.len(), "Loaded sync state");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn counts_documents_by_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "synced_at": "2026-01-05T10:00:00Z",
                "documents": {{
                    "kb/devrel/processes/process-release-notes.md": {{ "section": "devrel" }},
                    "kb/devrel/guides/talks.md": {{ "section": "devrel" }},
                    "kb/support/checklist-refunds.md": {{ "section": "support", "document_name": "fileSearchStores/kb/documents/abc" }},
                    "kb/misc.md": {{}}
                }}
            }}"#
        )
        .unwrap();

        let state = SyncStateFile::new(file.path()).load().await.unwrap();
        let stats = state.document_stats();

        assert!(state.synced_at.is_some());
        assert_eq!(stats.get("devrel"), 2);
        assert_eq!(stats.get("support"), 1);
        assert_eq!(stats.get(DocumentStats::UNCATEGORIZED), 1);
        assert_eq!(stats.total(), 4);
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncStateFile::new(dir.path().join("nope.json"))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SyncStateUnavailable { .. }));
    }

    #[tokio::test]
    async fn garbage_is_a_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SyncStateFile::new(file.path()).load().await.unwrap_err();
        assert!(matches!(err, Error::SyncStateFormat(_)));
    }
}
