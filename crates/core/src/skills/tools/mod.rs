//! # Research Tools
//!
//! External data sources used by the research stage.

pub mod search_tools;

pub use search_tools::{SearchCall, SearchClient, SearchHit};
