//! astral: a chat backend that assembles bounded prompts from conversation
//! memory and live web search before calling a hosted completion API.

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod relevance;
pub mod search;
pub mod secrets;
pub mod types;
