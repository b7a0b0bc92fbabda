//! # agentrun-core
//!
//! Drives coding-agent sessions and reduces their event streams into
//! assertable results.
//!
//! This crate provides:
//! - `EventNormalizer`, the reducer from ordered session events to a `RunResult`
//! - Confirmation policies applied when the runtime asks for permission
//! - `SessionDriver`, which runs one task with a wall-clock timeout
//! - `ComparativeRunner`, which runs baseline/treatment pairs in isolated workspaces
//! - Pricing, transcript rendering and the instruction optimizer seam
//! - Scripted connectors and JSONL recording for deterministic tests

mod comparative;
mod confirmation;
mod driver;
pub mod logging;
mod normalizer;
pub mod optimizer;
mod pricing;
pub mod testing;
pub mod transcript;

pub use comparative::{ComparativeRunner, PairError, PairExecution, RunPair, Side, Workspace};
pub use confirmation::{
    AutoApprove, ConfirmationPolicy, Passthrough, PolicyFactory, ToolRules, default_policy,
    default_policy_factory,
};
pub use driver::{SessionDriver, TIMEOUT_MARKER};
pub use normalizer::{EventNormalizer, FallbackMatching, NormalizerOptions};
pub use optimizer::{
    InstructionOptimizer, InstructionSuggestion, OptimizerError, PromptOptimizer, TextGenerator,
};
pub use pricing::{ModelPrice, PricingTable};
