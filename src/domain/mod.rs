//! Domain types and the ports the application layer depends on.

pub mod balance;
pub mod payment;
pub mod ports;
