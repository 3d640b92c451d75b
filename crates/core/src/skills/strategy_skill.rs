//! # Strategy Skill
//!
//! Produces strategic guidance from the analyses. The executive summary is
//! always last in every plan so it can draw on the other outputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::ModelConfig;
use crate::pipeline::{ResearchQuery, ResearchType, StageTicker};
use crate::run_llm_function;
use crate::skills::analysis_skill::{AnalysisOutput, Insight};
use crate::skills::prompts;

/// Characters of each analysis shown to the strategist
const ANALYSIS_EXCERPT_CHARS: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Recommendations,
    Risks,
    Opportunities,
    ActionPlan,
    CompetitiveResponse,
    ExecutiveSummary,
}

impl StrategyKind {
    /// Outputs produced for a research type, in order
    pub fn plan(research_type: ResearchType) -> &'static [StrategyKind] {
        use StrategyKind::*;
        match research_type {
            ResearchType::MarketOverview => &[Recommendations, Opportunities, ExecutiveSummary],
            ResearchType::CompetitorAnalysis => {
                &[Risks, CompetitiveResponse, Recommendations, ExecutiveSummary]
            }
            ResearchType::TrendAnalysis => &[Opportunities, Recommendations, ExecutiveSummary],
            ResearchType::FullReport => &[
                Recommendations,
                Risks,
                Opportunities,
                ActionPlan,
                ExecutiveSummary,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Recommendations => "recommendations",
            StrategyKind::Risks => "risks",
            StrategyKind::Opportunities => "opportunities",
            StrategyKind::ActionPlan => "action_plan",
            StrategyKind::CompetitiveResponse => "competitive_response",
            StrategyKind::ExecutiveSummary => "executive_summary",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Recommendations => "Drafting recommendations",
            StrategyKind::Risks => "Assessing risks",
            StrategyKind::Opportunities => "Identifying opportunities",
            StrategyKind::ActionPlan => "Building action plan",
            StrategyKind::CompetitiveResponse => "Planning competitive response",
            StrategyKind::ExecutiveSummary => "Writing executive summary",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            StrategyKind::Recommendations => {
                "Generate specific, actionable recommendations. Rate each with a priority \
                 (high/medium/low) and put the timeframe and rationale in the detail."
            }
            StrategyKind::Risks => {
                "Assess risks and threats: category \
                 (Market/Competitive/Operational/Financial/Regulatory), likelihood as the \
                 rating, and a mitigation in the detail. Name the overall risk level in the \
                 summary."
            }
            StrategyKind::Opportunities => {
                "Identify strategic opportunities: category \
                 (Growth/Innovation/Efficiency/Partnership/Market Entry), feasibility as the \
                 rating and the first action in the detail. Separate quick wins from \
                 strategic bets."
            }
            StrategyKind::ActionPlan => {
                "Create a phased action plan. One finding per phase with its goal, actions \
                 and timeline. List success metrics in the summary."
            }
            StrategyKind::CompetitiveResponse => {
                "Develop competitive response strategies: the threat, the response, and its type \
                 (Defensive/Offensive/Differentiation) as the rating. Cover moats worth building."
            }
            StrategyKind::ExecutiveSummary => {
                "Write the executive summary. Key findings go in the findings, each with its \
                 business implication; the bottom line belongs at the end of the summary."
            }
        }
    }
}

/// Output of the strategize stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyOutput {
    pub strategies: BTreeMap<StrategyKind, Insight>,
    pub executive_summary: String,
}

pub struct StrategySkill;

impl StrategySkill {
    /// Produce every planned output, reporting one unit each
    pub async fn run(
        query: &ResearchQuery,
        analysis: &AnalysisOutput,
        config: &ModelConfig,
        ticker: &StageTicker,
    ) -> anyhow::Result<StrategyOutput> {
        let plan = StrategyKind::plan(query.research_type);
        let total = plan.len() as u32;
        let context = analysis_context(analysis);
        let mut strategies = BTreeMap::new();

        for (i, kind) in plan.iter().enumerate() {
            let prompt = format!(
                "Strategic output: {}\nFor: {}\nResearch type: {}\n\n{}\n\nANALYSIS DATA:\n{}",
                kind.as_str(),
                query.company_or_query(),
                query.research_type.display_name(),
                kind.instructions(),
                context
            );
            let insight = run_llm_function!(config, Insight, prompts::STRATEGY, prompt)?;
            strategies.insert(*kind, insight);
            ticker.report(i as u32 + 1, total, kind.label()).await?;
        }

        let executive_summary = strategies
            .get(&StrategyKind::ExecutiveSummary)
            .map(|s| s.summary.clone())
            .unwrap_or_default();

        Ok(StrategyOutput {
            strategies,
            executive_summary,
        })
    }
}

/// Analyses rendered as labelled JSON excerpts
pub fn analysis_context(analysis: &AnalysisOutput) -> String {
    if analysis.analyses.is_empty() {
        return "No analysis available.".to_string();
    }
    analysis
        .analyses
        .iter()
        .map(|(kind, insight)| {
            let body = serde_json::to_string_pretty(insight).unwrap_or_default();
            let excerpt: String = body.chars().take(ANALYSIS_EXCERPT_CHARS).collect();
            format!("=== {} ===\n{}", kind.as_str().to_uppercase(), excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::analysis_skill::AnalysisKind;

    #[test]
    fn test_executive_summary_closes_every_plan() {
        for kind in ResearchType::all() {
            let plan = StrategyKind::plan(kind);
            assert_eq!(plan.last(), Some(&StrategyKind::ExecutiveSummary), "{}", kind);
        }
        assert!(StrategyKind::plan(ResearchType::CompetitorAnalysis)
            .contains(&StrategyKind::CompetitiveResponse));
        assert_eq!(StrategyKind::plan(ResearchType::FullReport).len(), 5);
    }

    #[test]
    fn test_analysis_context_labels_sections() {
        let mut analyses = BTreeMap::new();
        analyses.insert(
            AnalysisKind::MarketSize,
            Insight {
                summary: "$12B in 2024".into(),
                findings: vec![],
                confidence: "high".into(),
            },
        );
        let text = analysis_context(&AnalysisOutput {
            analyses,
            data_points_analyzed: 4,
        });
        assert!(text.starts_with("=== MARKET_SIZE ==="));
        assert!(text.contains("$12B in 2024"));
    }
}
