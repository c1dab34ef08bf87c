//! Language-model driven record generation.
//!
//! A [`Generator`] turns one completion into one validated, deduplicated
//! batch; a [`GenerationRun`] drives batches until a record set reaches its
//! target size, persisting after every accepted batch.

pub mod errors;
pub mod generator;
pub mod llm;
pub mod model;
pub mod prompt;
pub mod response;
pub mod run;

pub use errors::{GenerationError, LlmError};
pub use generator::{Generator, GeneratorOptions};
pub use llm::{
    AnthropicClient, Completion, CompletionClient, CompletionRequest, OpenAiClient,
    ScriptedClient,
};
pub use model::{BatchReport, GeneratedBatch, GenerationReport, Rejection, RejectionReason};
pub use run::{GenerationRun, RunOptions};
