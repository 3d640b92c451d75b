//! Default prompt templates bundled at compile time.

/// Research Analyst - synthesizes search results into a digest
pub const RESEARCH: &str = include_str!("defaults/research.md");

/// Market Analyst - runs one analysis over the research data
pub const ANALYSIS: &str = include_str!("defaults/analysis.md");

/// Strategy Consultant - turns analyses into strategic guidance
pub const STRATEGY: &str = include_str!("defaults/strategy.md");

/// All default prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("research", RESEARCH),
        ("analysis", ANALYSIS),
        ("strategy", STRATEGY),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_prompts_non_empty() {
        for (slug, content) in all_defaults() {
            assert!(content.len() > 50, "Prompt '{}' seems too short", slug);
            assert!(content.starts_with("# Role:"), "Prompt '{}' lacks a role header", slug);
        }
    }
}
