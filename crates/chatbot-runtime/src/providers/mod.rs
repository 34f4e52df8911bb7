//! Inference provider implementations
//!
//! This module contains concrete implementations of the InferenceProvider
//! trait for model runtimes.

pub mod ollama;

pub use ollama::OllamaProvider;
