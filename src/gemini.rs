use std::collections::HashSet;
use std::time::Duration;

use futures::future::try_join_all;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use serenity::async_trait;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    dispatch::AnswerService,
    error::{Error, Result},
    metrics::ANSWER_DURATION,
    schema::{Answer, DocumentStats},
    sections::SECTION_METADATA_KEY,
};

const SYSTEM_INSTRUCTION: &str = "You are an internal assistant.\n\
- Answer in the same language the user wrote in.\n\
- Use the knowledge base (File Search) to answer.\n\
- Be very concise by default: 5-8 lines at most.\n\
- If the question is broad, give a summary and offer to go deeper (\"I can detail X if you want\").\n\
- If the knowledge base does not have enough information, say so and ask for context.";

const TEMPERATURE: f64 = 0.2;
const DOCUMENTS_PAGE_SIZE: u32 = 20;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    store_names: Vec<String>,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: cfg.gemini_key.clone(),
            model: cfg.gemini_model.clone(),
            base_url: cfg.gemini_base_url.clone(),
            store_names: cfg.store_names.clone(),
        })
    }

    pub async fn generate_answer(&self, question: &str, metadata_filter: Option<&str>) -> Result<Answer> {
        let _timer = ANSWER_DURATION.start_timer();
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let mut file_search = json!({ "fileSearchStoreNames": self.store_names });
        if let Some(filter) = metadata_filter {
            file_search["metadataFilter"] = json!(filter);
        }

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
                "contents": [{ "role": "user", "parts": [{ "text": question }] }],
                "tools": [{ "fileSearch": file_search }],
                "generationConfig": { "temperature": TEMPERATURE }
            }))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await?;
            error!(status = ?status, body = ?body, "Gemini generateContent failed");
            return Err(Error::Upstream { status: status.as_u16(), body });
        }

        let body: Value = res.json().await?;
        let answer = parse_answer(&body)?;
        info!(len = answer.text.len(), citations = answer.citations.len(), filter = ?metadata_filter, "Got answer");
        Ok(answer)
    }

    /// Live document counts across every configured store.
    pub async fn count_documents(&self) -> Result<DocumentStats> {
        let per_store =
            try_join_all(self.store_names.iter().map(|store| self.count_store_documents(store)))
                .await?;

        let mut stats = DocumentStats::default();
        for store_stats in per_store {
            stats.merge(store_stats);
        }
        Ok(stats)
    }

    async fn count_store_documents(&self, store: &str) -> Result<DocumentStats> {
        let url = format!("{}/{}/documents", self.base_url, store);
        let mut stats = DocumentStats::default();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .get(&url)
                .header("x-goog-api-key", &self.api_key)
                .query(&[("pageSize", DOCUMENTS_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }

            let res = req.send().await?;
            let status = res.status();
            // The documents endpoint answers 400 once a listing can't continue.
            if status == StatusCode::BAD_REQUEST {
                warn!(store, "Document listing stopped with 400");
                break;
            }
            if !status.is_success() {
                let body = res.text().await?;
                error!(status = ?status, body = ?body, store, "Document listing failed");
                return Err(Error::Upstream { status: status.as_u16(), body });
            }

            let body: Value = res.json().await?;
            page_token = record_documents(&body, &mut stats);
            if page_token.is_none() {
                break;
            }
        }

        info!(store, documents = stats.total(), "Counted live documents");
        Ok(stats)
    }

    /// Cheap reachability probe used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let res = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Upstream { status: status.as_u16(), body: res.text().await? })
        }
    }
}

#[async_trait]
impl AnswerService for GeminiClient {
    async fn answer(&self, question: &str, metadata_filter: Option<&str>) -> Result<Answer> {
        self.generate_answer(question, metadata_filter).await
    }

    async fn actual_document_stats(&self) -> Result<DocumentStats> {
        self.count_documents().await
    }
}

pub fn parse_answer(body: &Value) -> Result<Answer> {
    let candidate = body["candidates"]
        .get(0)
        .ok_or_else(|| Error::Malformed("no candidates in response".into()))?;

    let text = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect::<String>())
        .unwrap_or_default();

    Ok(Answer {
        text: text.trim().to_string(),
        citations: extract_citations(&candidate["groundingMetadata"]),
    })
}

/// Source labels from grounding metadata, de-duplicated in first-seen order.
fn extract_citations(grounding: &Value) -> Vec<String> {
    let Some(chunks) = grounding["groundingChunks"].as_array() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter_map(|chunk| {
            let ctx = &chunk["retrievedContext"];
            let title = ctx["title"].as_str().map(str::trim).filter(|t| !t.is_empty());
            let uri = ctx["uri"].as_str().map(str::trim).filter(|u| !u.is_empty());
            title.or(uri).map(String::from)
        })
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

/// Adds one listing page to `stats`; returns the next page token, if any.
fn record_documents(body: &Value, stats: &mut DocumentStats) -> Option<String> {
    for doc in body["documents"].as_array().into_iter().flatten() {
        let section = doc["customMetadata"]
            .as_array()
            .and_then(|entries| entries.iter().find(|e| e["key"] == SECTION_METADATA_KEY))
            .and_then(|entry| entry["stringValue"].as_str());
        stats.record(section);
    }

    body["nextPageToken"]
        .as_str()
        .filter(|token| !token.is_empty())
        .map(String::from)
}
