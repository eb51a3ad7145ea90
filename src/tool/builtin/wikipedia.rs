use crate::tool::{Tool, ToolContext, ToolError, ToolResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Longest query forwarded to the search API.
const MAX_QUERY_CHARS: usize = 300;
const NO_RESULT: &str = "No good Wikipedia Search Result was found";

/// Lookup settings, read from the `[wikipedia]` config table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WikipediaOptions {
    /// Language edition, e.g. `en` for en.wikipedia.org.
    pub language: String,
    /// Pages summarised per lookup.
    pub top_k_results: usize,
    /// Cap on the combined output, in characters.
    pub doc_content_chars_max: usize,
}

impl Default for WikipediaOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            top_k_results: 3,
            doc_content_chars_max: 4000,
        }
    }
}

impl WikipediaOptions {
    fn api_url(&self) -> String {
        format!("https://{}.wikipedia.org/w/api.php", self.language)
    }
}

pub struct WikipediaTool {
    client: Client,
    api_url: String,
    options: WikipediaOptions,
}

impl WikipediaTool {
    #[must_use]
    pub fn new(options: WikipediaOptions) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("mathgpt/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_url: options.api_url(),
            options,
        }
    }

    /// Point at a different MediaWiki endpoint.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<T, ToolError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Wikipedia request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "Wikipedia returned HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Unreadable Wikipedia response: {e}")))
    }

    async fn search_titles(&self, query: &str) -> Result<Vec<String>, ToolError> {
        let limit = self.options.top_k_results.to_string();
        let response: SearchResponse = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", &limit),
            ])
            .await?;

        Ok(response
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    /// Lead-section plain-text extract; `None` for missing or empty pages.
    async fn summary(&self, title: &str) -> Result<Option<String>, ToolError> {
        let response: ExtractResponse = self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .await?;

        Ok(response
            .query
            .and_then(|q| q.pages.into_iter().next())
            .filter(|page| !page.missing)
            .and_then(|page| page.extract)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty()))
    }

    /// Search and summarise, formatted for the model.
    pub async fn lookup(&self, query: &str) -> Result<String, ToolError> {
        let query: String = query.chars().take(MAX_QUERY_CHARS).collect();
        let titles = self.search_titles(&query).await?;

        let mut summaries = Vec::new();
        for title in titles.iter().take(self.options.top_k_results) {
            match self.summary(title).await {
                Ok(Some(extract)) => summaries.push(format_page(title, &extract)),
                Ok(None) => {}
                Err(e) => tracing::warn!(%title, "Skipping page: {e}"),
            }
        }

        if summaries.is_empty() {
            return Ok(NO_RESULT.to_string());
        }
        Ok(truncate_chars(
            &summaries.join("\n\n"),
            self.options.doc_content_chars_max,
        ))
    }
}

fn format_page(title: &str, extract: &str) -> String {
    format!("Page: {title}\nSummary: {extract}")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    missing: bool,
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia_search"
    }

    fn description(&self) -> &str {
        "Search Wikipedia for math constants, history, or formulas."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Topic to look up, e.g. \"Euler's identity\""
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("query is required".to_string()))?;

        if query.trim().is_empty() {
            return Err(ToolError::InvalidArgs("query must not be empty".to_string()));
        }

        tracing::debug!(session = %ctx.session_id, %query, "Wikipedia lookup");
        let content = self.lookup(query.trim()).await?;
        let found = content != NO_RESULT;

        Ok(ToolResult::text(content).with_metadata(json!({ "query": query, "found": found })))
    }
}
