//! # Models
//!
//! Ecological inference samplers. See [`eco`] for the 2x2 and 2xC models.

pub mod eco;
