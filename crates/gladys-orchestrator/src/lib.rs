//! The Orchestrator service: ingests events, evaluates salience, routes
//! between an emergency fast path and the priority queue, fans out events
//! and responses to subscribers, and runs the Learning Module and Outcome
//! Watcher that turn feedback into Memory confidence updates.

pub mod client;
pub mod config;
pub mod learning;
pub mod outcome_watcher;
pub mod queue;
pub mod salience;
pub mod server;
pub mod subscribers;

pub use config::Config;
pub use server::OrchestratorService;
