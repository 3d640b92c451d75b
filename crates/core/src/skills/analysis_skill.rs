//! # Analysis Skill
//!
//! Turns research findings into structured insights, one LLM call per
//! analysis in the research type's plan.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::ModelConfig;
use crate::pipeline::{ResearchQuery, ResearchType, StageTicker};
use crate::run_llm_function;
use crate::skills::prompts;
use crate::skills::research_skill::{format_hits, ResearchFindings};

/// A single item inside an insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct InsightItem {
    /// Short name of the finding, segment, player, trend or statistic
    pub title: String,
    /// One sentence of detail or rationale
    pub detail: String,
    /// Qualitative rating where the analysis asks for one
    #[serde(default)]
    pub rating: Option<String>,
}

/// Structured result of one analysis or strategy call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct Insight {
    /// One-paragraph answer to the requested analysis
    pub summary: String,
    /// Individual items backing the summary
    pub findings: Vec<InsightItem>,
    /// "high", "medium" or "low", based on data quality
    pub confidence: String,
}

/// The analyses the analyze stage can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    MarketSize,
    MarketSegments,
    CompetitiveLandscape,
    Swot,
    Trends,
    KeyStatistics,
}

impl AnalysisKind {
    /// Analyses run for a research type, in order
    pub fn plan(research_type: ResearchType) -> &'static [AnalysisKind] {
        use AnalysisKind::*;
        match research_type {
            ResearchType::MarketOverview => &[MarketSize, MarketSegments, Trends, KeyStatistics],
            ResearchType::CompetitorAnalysis => &[CompetitiveLandscape, Swot, KeyStatistics],
            ResearchType::TrendAnalysis => &[Trends, MarketSegments, KeyStatistics],
            ResearchType::FullReport => &[MarketSize, CompetitiveLandscape, Swot, Trends],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::MarketSize => "market_size",
            AnalysisKind::MarketSegments => "market_segments",
            AnalysisKind::CompetitiveLandscape => "competitive_landscape",
            AnalysisKind::Swot => "swot",
            AnalysisKind::Trends => "trends",
            AnalysisKind::KeyStatistics => "key_statistics",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::MarketSize => "Sizing the market",
            AnalysisKind::MarketSegments => "Segmenting the market",
            AnalysisKind::CompetitiveLandscape => "Mapping the competitive landscape",
            AnalysisKind::Swot => "Running SWOT analysis",
            AnalysisKind::Trends => "Identifying trends",
            AnalysisKind::KeyStatistics => "Extracting key statistics",
        }
    }

    /// What the findings of this analysis must cover
    fn instructions(&self) -> &'static str {
        match self {
            AnalysisKind::MarketSize => {
                "Extract market size and growth: current size with currency, projected size \
                 with timeline, CAGR, growth drivers, and market maturity \
                 (emerging/growing/mature/declining)."
            }
            AnalysisKind::MarketSegments => {
                "Identify market segments: name, what each includes, size share if available and \
                 growth outlook. Name the largest and the fastest growing segment."
            }
            AnalysisKind::CompetitiveLandscape => {
                "Map the market leaders: company, market share if available, position \
                 (Leader/Challenger/Follower/Niche) and key strengths. Assess competitive \
                 intensity and barriers to entry."
            }
            AnalysisKind::Swot => {
                "Perform a SWOT analysis. Prefix each finding title with Strength, Weakness, \
                 Opportunity or Threat, and state the strategic implication in the summary."
            }
            AnalysisKind::Trends => {
                "Identify emerging trends: name, category \
                 (Technology/Consumer/Regulatory/Economic), impact level and timeline. \
                 Include mega trends and disruption risks."
            }
            AnalysisKind::KeyStatistics => {
                "Extract key statistics: metric, value and what it means. Note the data \
                 quality and important metrics that were not found."
            }
        }
    }
}

/// Output of the analyze stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    pub analyses: BTreeMap<AnalysisKind, Insight>,
    pub data_points_analyzed: usize,
}

pub struct AnalysisSkill;

impl AnalysisSkill {
    /// Run every planned analysis, reporting one unit each
    pub async fn run(
        query: &ResearchQuery,
        findings: &ResearchFindings,
        config: &ModelConfig,
        ticker: &StageTicker,
    ) -> anyhow::Result<AnalysisOutput> {
        if findings.hits.is_empty() {
            anyhow::bail!("no research data to analyze");
        }

        let plan = AnalysisKind::plan(query.research_type);
        let total = plan.len() as u32;
        let data = format_hits(&findings.hits);
        let mut analyses = BTreeMap::new();

        for (i, kind) in plan.iter().enumerate() {
            let prompt = format!(
                "Analysis: {}\nSubject: {}\nCompany of interest: {}\nKnown competitors: {}\n\n\
                 {}\n\nRESEARCH OVERVIEW:\n{}\n\nDATA:\n{}",
                kind.as_str(),
                subject(query, *kind),
                query.company_name.as_deref().unwrap_or("Not specified"),
                query.competitor_list(),
                kind.instructions(),
                findings.digest.overview,
                data
            );
            let insight = run_llm_function!(config, Insight, prompts::ANALYSIS, prompt)?;
            tracing::debug!(
                analysis = kind.as_str(),
                findings = insight.findings.len(),
                "Analysis finished"
            );
            analyses.insert(*kind, insight);
            ticker.report(i as u32 + 1, total, kind.label()).await?;
        }

        Ok(AnalysisOutput {
            analyses,
            data_points_analyzed: findings.hits.len(),
        })
    }
}

fn subject(query: &ResearchQuery, kind: AnalysisKind) -> &str {
    match kind {
        AnalysisKind::Swot | AnalysisKind::CompetitiveLandscape => query.company_or_query(),
        AnalysisKind::Trends | AnalysisKind::MarketSegments => query.industry_or_query(),
        _ => &query.query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plans_per_research_type() {
        assert_eq!(
            AnalysisKind::plan(ResearchType::MarketOverview),
            &[
                AnalysisKind::MarketSize,
                AnalysisKind::MarketSegments,
                AnalysisKind::Trends,
                AnalysisKind::KeyStatistics
            ]
        );
        assert_eq!(AnalysisKind::plan(ResearchType::CompetitorAnalysis).len(), 3);
        assert_eq!(AnalysisKind::plan(ResearchType::TrendAnalysis)[0], AnalysisKind::Trends);
        assert!(AnalysisKind::plan(ResearchType::FullReport).contains(&AnalysisKind::Swot));
    }

    #[test]
    fn test_analysis_map_serializes_by_kind() {
        let mut analyses = BTreeMap::new();
        analyses.insert(
            AnalysisKind::Swot,
            Insight {
                summary: "Strong brand, thin margins".into(),
                findings: vec![],
                confidence: "medium".into(),
            },
        );
        let output = AnalysisOutput {
            analyses,
            data_points_analyzed: 12,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["analyses"]["swot"]["confidence"], "medium");
        assert_eq!(json["dataPointsAnalyzed"], 12);
    }
}
