//! Library half of the `riskscan` binary.
pub mod commands;
