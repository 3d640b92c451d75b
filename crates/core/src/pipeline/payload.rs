//! # Research Payload
//!
//! Request validation and the aggregate result handed to the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of analysis requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchType {
    MarketOverview,
    CompetitorAnalysis,
    TrendAnalysis,
    FullReport,
}

impl ResearchType {
    pub fn all() -> Vec<ResearchType> {
        vec![
            ResearchType::MarketOverview,
            ResearchType::CompetitorAnalysis,
            ResearchType::TrendAnalysis,
            ResearchType::FullReport,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchType::MarketOverview => "market_overview",
            ResearchType::CompetitorAnalysis => "competitor_analysis",
            ResearchType::TrendAnalysis => "trend_analysis",
            ResearchType::FullReport => "full_report",
        }
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            ResearchType::MarketOverview => "Market Overview",
            ResearchType::CompetitorAnalysis => "Competitor Analysis",
            ResearchType::TrendAnalysis => "Trend Analysis",
            ResearchType::FullReport => "Full Research Report",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResearchType::MarketOverview => {
                "Market size, trends, and opportunities analysis using real-time web data"
            }
            ResearchType::CompetitorAnalysis => {
                "Competitor profiling, SWOT, and positioning analysis with current market data"
            }
            ResearchType::TrendAnalysis => {
                "Emerging trends, patterns, and future predictions from real-time sources"
            }
            ResearchType::FullReport => {
                "Comprehensive report combining all research dimensions with strategic \
                 recommendations"
            }
        }
    }
}

impl fmt::Display for ResearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "market_overview" => Ok(ResearchType::MarketOverview),
            "competitor_analysis" => Ok(ResearchType::CompetitorAnalysis),
            "trend_analysis" => Ok(ResearchType::TrendAnalysis),
            "full_report" => Ok(ResearchType::FullReport),
            other => Err(ValidationError::UnknownResearchType(other.to_string())),
        }
    }
}

/// Input rejected before any stage starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("unknown research type '{0}'")]
    UnknownResearchType(String),
}

/// Raw request body as submitted by the client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "research_type")]
    pub research_type: String,
    #[serde(default, alias = "company_name", skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// `null` is read as no competitors
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub competitors: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, research_type: ResearchType) -> Self {
        Self {
            query: query.into(),
            research_type: research_type.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Check and normalize the request
    pub fn validate(&self) -> Result<ResearchQuery, ValidationError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        let research_type = self.research_type.parse::<ResearchType>()?;

        Ok(ResearchQuery {
            query: query.to_string(),
            research_type,
            company_name: non_blank(self.company_name.as_deref()),
            industry: non_blank(self.industry.as_deref()),
            competitors: self
                .competitors
                .iter()
                .filter_map(|c| non_blank(Some(c)))
                .collect(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A validated research request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchQuery {
    pub query: String,
    pub research_type: ResearchType,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub competitors: Vec<String>,
}

impl ResearchQuery {
    /// Company if given, otherwise the query itself
    pub fn company_or_query(&self) -> &str {
        self.company_name.as_deref().unwrap_or(&self.query)
    }

    /// Industry if given, otherwise the query itself
    pub fn industry_or_query(&self) -> &str {
        self.industry.as_deref().unwrap_or(&self.query)
    }

    pub fn competitor_list(&self) -> String {
        if self.competitors.is_empty() {
            "to be identified".to_string()
        } else {
            self.competitors.join(", ")
        }
    }
}

/// Overall job status carried by the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStatus {
    #[default]
    Pending,
    Completed,
}

/// The aggregate research result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchPayload {
    pub research_id: String,
    pub research_type: ResearchType,
    pub status: PayloadStatus,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub results: serde_json::Value,
}

impl ResearchPayload {
    pub fn new(research_id: impl Into<String>, research_type: ResearchType) -> Self {
        Self {
            research_id: research_id.into(),
            research_type,
            status: PayloadStatus::Pending,
            timestamp: Utc::now(),
            summary: String::new(),
            results: serde_json::Value::Null,
        }
    }

    /// `research_<date>_<time>_<suffix>`, unique across concurrent requests
    pub fn generate_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "research_{}_{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        )
    }
}
