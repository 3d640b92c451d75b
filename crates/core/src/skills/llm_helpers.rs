//! # LLM Helpers
//!
//! Runs a typed `LlmFunction` against whichever provider a [`ModelConfig`]
//! names, so skills never match on providers themselves.
//!
//! [`ModelConfig`]: crate::models::ModelConfig

/// Run an `LlmFunction` with any provider.
///
/// Must be used inside an async function returning `anyhow::Result`; a
/// missing API key is propagated with `?`.
#[macro_export]
macro_rules! run_llm_function {
    (@call $llm:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {
        radkit::agent::LlmFunction::<$output_type>::new_with_system_instructions(
            $llm,
            $system_prompt,
        )
        .run($input)
        .await
        .map_err(Into::into)
    };
    ($config:expr, $output_type:ty, $system_prompt:expr, $input:expr) => {{
        use radkit::models::providers::{
            AnthropicLlm, DeepSeekLlm, GeminiLlm, GrokLlm, OpenAILlm, OpenRouterLlm,
        };
        use $crate::models::LlmProvider;

        let config = $config;
        let model = config.model.as_str();
        let result: anyhow::Result<$output_type> = match config.provider {
            LlmProvider::Anthropic => $crate::run_llm_function!(
                @call AnthropicLlm::from_env(model)?, $output_type, $system_prompt, $input
            ),
            LlmProvider::OpenAI => {
                let llm = match &config.base_url {
                    Some(base_url) => OpenAILlm::from_env(model)?.with_base_url(base_url),
                    None => OpenAILlm::from_env(model)?,
                };
                $crate::run_llm_function!(@call llm, $output_type, $system_prompt, $input)
            }
            LlmProvider::Gemini => $crate::run_llm_function!(
                @call GeminiLlm::from_env(model)?, $output_type, $system_prompt, $input
            ),
            LlmProvider::OpenRouter => $crate::run_llm_function!(
                @call OpenRouterLlm::from_env(model)?, $output_type, $system_prompt, $input
            ),
            LlmProvider::Grok => $crate::run_llm_function!(
                @call GrokLlm::from_env(model)?, $output_type, $system_prompt, $input
            ),
            LlmProvider::DeepSeek => $crate::run_llm_function!(
                @call DeepSeekLlm::from_env(model)?, $output_type, $system_prompt, $input
            ),
        };
        result
    }};
}

pub use run_llm_function;
