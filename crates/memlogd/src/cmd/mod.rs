//! Command implementations for the memlogd CLI

pub mod read;
pub mod send;
pub mod serve;
