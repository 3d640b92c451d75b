//! # MarketLens Core
//!
//! Market research pipeline with live progress streaming.
//!
//! ## Architecture
//!
//! - `pipeline/` - Stage emitter, pipeline driver and the stage agent seam
//! - `stream/` - Event-stream encoder, stream client and progress board
//! - `skills/` - Research, analysis, strategy and compile skills
//! - `models` / `config` - LLM provider and research configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use marketlens_core::config::ResearchConfig;
//! use marketlens_core::pipeline::{MarketResearchAgent, ResearchRequest, ResearchType};
//! use marketlens_core::stream::{consume_stream, ProgressStreamEncoder};
//!
//! let agent = Arc::new(MarketResearchAgent::new(ResearchConfig::from_env())?);
//! let query = ResearchRequest::new("AI market trends", ResearchType::MarketOverview).validate()?;
//! let progress = ProgressStreamEncoder::new().spawn(agent, query);
//! let body = progress.into_bytes().map(Ok::<_, Infallible>);
//! let payload = consume_stream(body, |event| println!("{:?}", event)).await?;
//! ```

pub mod config;
pub mod models;
pub mod pipeline;
pub mod skills;
pub mod stream;
