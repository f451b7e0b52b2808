//! sqlmig CLI - Command-line interface for solution-wide schema migrations.
//!
//! This crate provides the `sqlmig` tool: it scans a solution for migration
//! projects, renders their migrations and pending model changes, and drives
//! the external migration tool to add, remove, apply and reset migrations.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod tree;
