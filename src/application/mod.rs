//! Application layer containing the consumer orchestration.
//!
//! `ConsumptionLoop` drains the queue, `AdmissionGate` throttles what it
//! forwards, and `Ledger` applies each admitted payment exactly once.

pub mod consumer;
pub mod gate;
pub mod ledger;
