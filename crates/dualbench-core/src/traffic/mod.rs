//! Traffic generation and reception
//!
//! This module contains the moving parts of a run:
//! - Self-describing frame layout ([`frame`])
//! - Period and deadline bookkeeping ([`schedule`])
//! - Interchangeable scheduling strategies ([`strategy`])
//! - Dual-channel publisher ([`publisher`])
//! - Multiplexed dual-channel subscriber ([`subscriber`])

pub mod frame;
pub mod publisher;
pub mod schedule;
pub mod strategy;
pub mod subscriber;
