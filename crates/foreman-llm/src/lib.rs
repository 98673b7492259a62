//! Text-generation gateway for Foreman.
//!
//! Everything that talks to a model goes through the [`GenerationGateway`]
//! trait. The shipped backend speaks the OpenAI chat completions dialect,
//! which covers OpenAI, OpenRouter, Groq, and local servers exposing the
//! same API. Retrieval-augmented context comes in through the
//! [`ContextRetriever`] seam.
//!
//! # Main types
//!
//! - [`GenerationGateway`]: the generation seam every caller depends on.
//! - [`HttpGateway`]: reqwest-based OpenAI-compatible backend.
//! - [`ModelConfig`] / [`LlmProvider`]: provider selection and defaults.
//! - [`ContextRetriever`] / [`NullRetriever`]: retrieval seam.
//! - [`extract`]: tolerant JSON extraction from free-form model output.

/// Provider enum and model configuration.
pub mod config;
/// Tolerant JSON extraction from model output.
pub mod extract;
/// Gateway trait and HTTP backend.
pub mod gateway;
/// Retrieval seam.
pub mod retrieve;

pub use config::{LlmProvider, ModelConfig};
pub use gateway::{GenerationGateway, GenerationRequest, HttpGateway};
pub use retrieve::{ContextRetriever, NullRetriever};
