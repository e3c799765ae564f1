//! eduplanner-core: CIDDP scoring, plan ledger, response cache and the
//! planning iteration loop.
//!
//! The crate defines the data model, the agent traits, and the logic that
//! evaluates, optimizes and analyzes a lesson plan over a fixed number of
//! rounds. LLM backends are plugged in through [`traits::LlmProvider`].

pub mod agents;
pub mod cache;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod parser;
pub mod prompts;
pub mod questions;
pub mod report;
pub mod service;
pub mod skill;
pub mod statistics;
mod storage;
pub mod traits;
