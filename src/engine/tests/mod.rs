//! Orchestrator scenario tests.
//!
//! These run whole targets through the engine against an in-memory content
//! source and a transfer double that writes small files instead of hitting
//! the network.
