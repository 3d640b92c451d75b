//! # Research Skills
//!
//! The work behind each pipeline stage.
//!
//! ## Architecture
//!
//! ```text
//! MarketResearchAgent (StageAgent)
//!   └── Skills (one per stage, typed LlmFunction outputs)
//!         └── Tools (SearXNG search)
//! ```
//!
//! - `ResearchSkill` - Search plan plus digest of the hits
//! - `AnalysisSkill` - Market size, segments, landscape, SWOT, trends, statistics
//! - `StrategySkill` - Recommendations, risks, opportunities, executive summary
//! - `CompileSkill` - Final report, no LLM call

pub mod llm_helpers;
pub mod prompts;
pub mod tools;

pub mod analysis_skill;
pub mod compile_skill;
pub mod research_skill;
pub mod strategy_skill;

pub use analysis_skill::{AnalysisKind, AnalysisOutput, AnalysisSkill, Insight, InsightItem};
pub use compile_skill::{CompileSkill, FinalReport};
pub use research_skill::{ResearchDigest, ResearchFindings, ResearchSkill};
pub use strategy_skill::{StrategyKind, StrategyOutput, StrategySkill};
