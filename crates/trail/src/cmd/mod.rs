//! Command implementations for the Trail CLI

pub mod serve;
pub mod tail;
