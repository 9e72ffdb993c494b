//! relaygate - OpenAI-compatible gateway routing requests across upstream
//! LLM providers.
//!
//! Features:
//! - Model index over enabled providers with public-to-destination model casting
//! - Priority-ordered, randomized channel selection with per-key allowlists
//! - Retry and failover across keys and providers within one request
//! - Azure deployment addressing and per-model body rewrites
//! - JSON and multipart relay with streamed responses

pub mod adapter;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod check;
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod relay;
pub mod routing;
