//! Scalar reverse-mode automatic differentiation.
//!
//! Operations on [`engine::Value`] handles are recorded on the tape of their
//! [`engine::Graph`]; [`engine::Value::backward`] replays it newest first.
//! Clear the graph once per training iteration.

pub mod engine;
pub mod error;
pub mod loss;
pub mod nn;

pub use error::{Error, Result};
