//! Inbound SMS pipeline.
//!
//! Every verified webhook delivery flows through:
//! 1. `InboundSms::from_params()`: vendor form fields to a typed message
//! 2. `InboundProcessor::process()`: idempotency, rate limit and routing
//! 3. `TriageAnalyzer::analyze()`: keyword pass, then vision on photos
//! 4. Ticket insert and confirmation SMS

pub mod classifier;
pub mod processor;
pub mod rules;
pub mod types;

pub use classifier::TriageAnalyzer;
pub use processor::InboundProcessor;
pub use types::{InboundSms, MaintenanceAnalysis, Outcome};
