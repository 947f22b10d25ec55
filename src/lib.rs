//! Rental maintenance: SMS intake, triage and ticketing for property managers.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod phone;
pub mod pipeline;
pub mod ratelimit;
pub mod store;
pub mod telephony;
