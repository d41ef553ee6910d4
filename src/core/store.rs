//! Access to the core tables.
//!
//! Writes take a transaction, reads anything implementing `GenericClient`.
pub mod accounts;
pub mod baker_cycles;
pub mod blocks;
pub mod protocols;
pub mod rights;
pub mod statistics;
