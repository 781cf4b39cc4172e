//! Synapse - an autonomous goal-execution engine.
//!
//! Accepts natural-language goals, routes them through a pipeline of
//! small reasoning units, executes tools in a sandbox, records every
//! execution, and uses that record to monitor its own health and
//! rewrite underperforming tools.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
