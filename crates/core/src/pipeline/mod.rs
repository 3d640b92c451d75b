//! # Research Pipeline
//!
//! Drives one research request through its stages and reports progress.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Request → Research → Analyze → Strategize → Compile → ResearchPayload
//!              │          │           │           │
//!              └──────────┴─ StageEmitter ────────┘──▶ StreamFrame queue
//! ```

pub mod agent;
pub mod driver;
pub mod emitter;
pub mod events;
pub mod market_agent;
pub mod payload;
pub mod state;

pub use agent::{StageAgent, StageInput, StageOutputs};
pub use driver::{PipelineDriver, PipelineError, DEFAULT_SUMMARY};
pub use emitter::{EmitError, StageEmitter, StageTicker};
pub use events::{ProgressEvent, Stage, StageStatus, StreamFrame, TerminalEvent, TerminalStatus};
pub use market_agent::MarketResearchAgent;
pub use payload::{
    PayloadStatus, ResearchPayload, ResearchQuery, ResearchRequest, ResearchType, ValidationError,
};
pub use state::{Pipeline, PipelineState};
