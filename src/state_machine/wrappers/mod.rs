//! Common wrappers for [`StateMachine`](super::StateMachine) containers that inject system
//! resources as input.
//!
//! The machines in this crate need the wall clock for timeout flags and staleness, but must not
//! read it themselves. Their containers generate it and pass it in ahead of each input.

pub mod input;
pub mod output;
