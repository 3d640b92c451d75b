//! # Research Skill
//!
//! Runs the search plan for a request, then condenses the hits into a
//! [`ResearchDigest`] with one LLM call.

use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::ModelConfig;
use crate::pipeline::{ResearchQuery, ResearchType, StageTicker};
use crate::run_llm_function;
use crate::skills::prompts;
use crate::skills::tools::{SearchCall, SearchClient, SearchHit};

/// Hits shown to the LLM per prompt
const PROMPT_HIT_LIMIT: usize = 20;
const SNIPPET_CHARS: usize = 200;

/// LLM synthesis of the search results
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ResearchDigest {
    /// Two to four sentence overview of what the sources say
    pub overview: String,
    /// Concrete data points such as market size, growth rates and shares
    pub key_findings: Vec<String>,
    /// Companies or organizations that appear repeatedly
    #[serde(default)]
    pub key_players: Vec<String>,
}

/// Output of the research stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchFindings {
    pub searches: Vec<SearchCall>,
    pub hits: Vec<SearchHit>,
    pub digest: ResearchDigest,
}

impl ResearchFindings {
    pub fn searches_performed(&self) -> usize {
        self.searches.len()
    }
}

/// Searches to run for a request, in order
pub fn research_plan(query: &ResearchQuery) -> Vec<SearchCall> {
    match query.research_type {
        ResearchType::MarketOverview => vec![
            SearchCall::market(query.industry_or_query()),
            SearchCall::Web {
                query: query.query.clone(),
            },
        ],
        ResearchType::CompetitorAnalysis => {
            let web = if query.competitors.is_empty() {
                query.query.clone()
            } else {
                format!("{} {}", query.query, query.competitors.join(" "))
            };
            vec![
                SearchCall::Company {
                    name: query.company_or_query().to_string(),
                },
                SearchCall::Web { query: web },
            ]
        }
        ResearchType::TrendAnalysis => vec![
            SearchCall::Market {
                industry: query.industry_or_query().to_string(),
                topic: "emerging trends".to_string(),
            },
            SearchCall::News {
                query: query.industry_or_query().to_string(),
            },
        ],
        ResearchType::FullReport => vec![
            SearchCall::market(query.industry_or_query()),
            SearchCall::Company {
                name: query.company_or_query().to_string(),
            },
            SearchCall::Web {
                query: query.query.clone(),
            },
        ],
    }
}

/// Numbered, truncated listing of hits for prompts
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No data available.".to_string();
    }
    hits.iter()
        .take(PROMPT_HIT_LIMIT)
        .enumerate()
        .map(|(i, hit)| {
            let title = if hit.title.is_empty() { "Untitled" } else { hit.title.as_str() };
            let mut entry = format!("[{}] {}", i + 1, title);
            if !hit.snippet.is_empty() {
                let snippet: String = hit.snippet.chars().take(SNIPPET_CHARS).collect();
                entry.push_str(&format!("\n    {}", snippet));
            }
            if !hit.url.is_empty() {
                entry.push_str(&format!("\n    Source: {}", hit.url));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct ResearchSkill;

impl ResearchSkill {
    /// Run every planned search, reporting one unit each, then synthesize
    pub async fn run(
        query: &ResearchQuery,
        search: &SearchClient,
        config: &ModelConfig,
        ticker: &StageTicker,
    ) -> anyhow::Result<ResearchFindings> {
        let plan = research_plan(query);
        let total = plan.len() as u32 + 1;
        let mut hits = Vec::new();

        for (i, call) in plan.iter().enumerate() {
            let found = search.run(call).await;
            tracing::info!(search = %call.label(), hits = found.len(), "Search finished");
            hits.extend(found);
            ticker.report(i as u32 + 1, total, call.label()).await?;
        }

        let digest = if hits.is_empty() {
            tracing::warn!(query = %query.query, "Searches returned nothing");
            ResearchDigest::default()
        } else {
            let prompt = format!(
                "Research request: {}\nResearch type: {}\nCompany: {}\nIndustry: {}\n\
                 Competitors: {}\n\nSEARCH RESULTS:\n{}",
                query.query,
                query.research_type.display_name(),
                query.company_name.as_deref().unwrap_or("N/A"),
                query.industry.as_deref().unwrap_or("General"),
                query.competitor_list(),
                format_hits(&hits)
            );
            run_llm_function!(config, ResearchDigest, prompts::RESEARCH, prompt)?
        };
        ticker
            .report(total, total, format!("Synthesized {} sources", hits.len()))
            .await?;

        Ok(ResearchFindings {
            searches: plan,
            hits,
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ResearchRequest;

    fn query(kind: ResearchType) -> ResearchQuery {
        let mut request = ResearchRequest::new("EV charging", kind);
        request.company_name = Some("ChargePoint".into());
        request.competitors = vec!["EVgo".into(), "Tesla".into()];
        request.validate().unwrap()
    }

    #[test]
    fn test_plan_per_research_type() {
        let overview = research_plan(&query(ResearchType::MarketOverview));
        assert_eq!(overview.len(), 2);
        assert!(matches!(
            overview[0],
            SearchCall::Market { ref industry, .. } if industry == "EV charging"
        ));

        let competitors = research_plan(&query(ResearchType::CompetitorAnalysis));
        assert_eq!(
            competitors,
            vec![
                SearchCall::Company { name: "ChargePoint".into() },
                SearchCall::Web { query: "EV charging EVgo Tesla".into() },
            ]
        );

        let trends = research_plan(&query(ResearchType::TrendAnalysis));
        assert!(matches!(
            trends[0],
            SearchCall::Market { ref topic, .. } if topic == "emerging trends"
        ));
        assert!(matches!(trends[1], SearchCall::News { .. }));

        assert_eq!(research_plan(&query(ResearchType::FullReport)).len(), 3);
    }

    #[test]
    fn test_format_hits_truncates() {
        let hits: Vec<SearchHit> = (0..25)
            .map(|i| SearchHit {
                title: format!("Result {}", i),
                url: format!("https://example.com/{}", i),
                snippet: "é".repeat(300),
                category: "web".into(),
                published: None,
            })
            .collect();
        let text = format_hits(&hits);
        assert!(text.starts_with("[1] Result 0"));
        assert!(text.contains("[20] Result 19"));
        assert!(!text.contains("[21]"));
        assert!(!text.contains(&"é".repeat(201)));
        assert_eq!(format_hits(&[]), "No data available.");
    }
}
