//! # Search Tools
//!
//! Web, news, company and market searches against SearXNG. A failed
//! search yields no hits instead of an error; the research stage decides
//! whether too little came back.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Public SearXNG instances tried after the configured one.
/// Full list: https://searx.space/
const PUBLIC_INSTANCES: [&str; 3] = [
    "https://searx.be/search",
    "https://search.sapti.me/search",
    "https://searx.tiekoetter.com/search",
];

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// overview, news, financial, market_data, market_news or web
    pub category: String,
    /// Publication date for news hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

/// A search the research stage can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchCall {
    /// General web search
    Web { query: String },
    /// Recent news
    News { query: String },
    /// Overview, news and financials of a company
    Company { name: String },
    /// Market data plus market news for an industry
    Market { industry: String, topic: String },
}

impl SearchCall {
    pub fn market(industry: impl Into<String>) -> Self {
        SearchCall::Market {
            industry: industry.into(),
            topic: "market size trends".to_string(),
        }
    }

    /// Progress label, e.g. `Searching market data: electric vehicles`
    pub fn label(&self) -> String {
        match self {
            SearchCall::Web { query } => format!("Searching the web: {}", query),
            SearchCall::News { query } => format!("Searching news: {}", query),
            SearchCall::Company { name } => format!("Researching company: {}", name),
            SearchCall::Market { industry, topic } => {
                format!("Searching market data: {} ({})", industry, topic)
            }
        }
    }
}

/// Client for a SearXNG backend
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    max_results: usize,
}

impl SearchClient {
    /// Build a client. `searxng_url` takes priority over public instances
    /// and the local fallback on port 8888.
    pub fn new(searxng_url: Option<&str>, max_results: usize) -> anyhow::Result<Self> {
        let mut endpoints: Vec<String> = Vec::new();
        if let Some(custom_url) = searxng_url {
            endpoints.push(format!("{}/search", custom_url.trim_end_matches('/')));
        }
        endpoints.extend(PUBLIC_INSTANCES.iter().map(|s| s.to_string()));
        endpoints.push("http://localhost:8888/search".to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("marketlens-research/1.0")
            .build()?;

        Ok(Self {
            http,
            endpoints,
            max_results: max_results.max(1),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Run one planned search call
    pub async fn run(&self, call: &SearchCall) -> Vec<SearchHit> {
        match call {
            SearchCall::Web { query } => self.web(query).await,
            SearchCall::News { query } => self.news(query).await,
            SearchCall::Company { name } => self.company(name).await,
            SearchCall::Market { industry, topic } => self.market(industry, topic).await,
        }
    }

    pub async fn web(&self, query: &str) -> Vec<SearchHit> {
        self.search(query, None, "web").await
    }

    pub async fn news(&self, query: &str) -> Vec<SearchHit> {
        self.search(query, Some("news"), "news").await
    }

    pub async fn company(&self, name: &str) -> Vec<SearchHit> {
        let mut hits = self
            .search(&format!("{} company overview profile", name), None, "overview")
            .await;
        hits.extend(
            self.search(&format!("{} company", name), Some("news"), "news")
                .await,
        );
        hits.extend(
            self.search(
                &format!("{} market share revenue financials", name),
                None,
                "financial",
            )
            .await,
        );
        hits
    }

    pub async fn market(&self, industry: &str, topic: &str) -> Vec<SearchHit> {
        let mut hits = self
            .search(&format!("{} {}", industry, topic), None, "market_data")
            .await;
        hits.extend(
            self.search(&format!("{} market", industry), Some("news"), "market_news")
                .await,
        );
        hits
    }

    async fn search(&self, query: &str, categories: Option<&str>, label: &str) -> Vec<SearchHit> {
        for endpoint in &self.endpoints {
            let mut url = format!("{}?q={}&format=json", endpoint, urlencoding::encode(query));
            if let Some(categories) = categories {
                url.push_str("&categories=");
                url.push_str(categories);
            }

            let response = match self.http.get(&url).send().await {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::debug!(%endpoint, status = %r.status(), "Search endpoint refused");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(%endpoint, "Search endpoint unreachable: {}", e);
                    continue;
                }
            };
            if let Ok(json) = response.json::<serde_json::Value>().await {
                if let Some(hits) = parse_results(&json, label, self.max_results) {
                    tracing::debug!(%endpoint, query, count = hits.len(), "Search succeeded");
                    return hits;
                }
            }
        }

        tracing::warn!(query, "No search backend answered");
        Vec::new()
    }
}

/// Map a SearXNG JSON response onto hits
fn parse_results(
    json: &serde_json::Value,
    category: &str,
    max_results: usize,
) -> Option<Vec<SearchHit>> {
    let results = json.get("results")?.as_array()?;
    let field = |r: &serde_json::Value, key: &str| {
        r.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    Some(
        results
            .iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: field(r, "title"),
                url: field(r, "url"),
                snippet: field(r, "content"),
                category: category.to_string(),
                published: r
                    .get("publishedDate")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            })
            .collect(),
    )
}
