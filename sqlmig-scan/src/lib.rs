//! # sqlmig-scan
//!
//! Solution scanner for schema migrations.
//!
//! This crate provides functionality for:
//! - Locating the solution manifest and its migration-bearing projects
//! - Loading each project's compiled artifact into an isolated, unloadable probe
//! - Reading recorded migrations and their applied/pending state
//! - Diffing the last recorded model snapshot against the declared model
//! - Rendering diff entries as human-readable, destructive-aware changes
//! - Releasing every isolated context so build outputs are never left locked
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────────┐
//! │   Locator    │────▶│   Inspector    │────▶│ Isolated Loader  │
//! └──────────────┘     └────────────────┘     └──────────────────┘
//!                              │                       │
//!                              ▼                       ▼
//!                      ┌────────────────┐     ┌──────────────────┐
//!                      │ Differ/Classify│     │  Probe process   │
//!                      └────────────────┘     └──────────────────┘
//!                              │                       ▲
//!                              ▼                       │
//!                      ┌────────────────┐     ┌──────────────────┐
//!                      │ Solution graph │     │ Context Tracker  │
//!                      └────────────────┘     └──────────────────┘
//! ```
//!
//! Each artifact is staged into a private directory (read fully into memory first) and
//! handed to a short-lived probe helper speaking a line-delimited JSON protocol. The
//! helper owns the schema-context framework; the host only ever sees type names,
//! migration identifiers and diff entries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlmig_scan::{ScannerConfig, SolutionScanner};
//!
//! let mut scanner = SolutionScanner::new(ScannerConfig::default());
//!
//! if let Some(solution) = scanner.scan(None) {
//!     for project in &solution.projects {
//!         for context in &project.descriptors {
//!             println!(
//!                 "{} / {}: {} migrations, {} pending changes",
//!                 project.name(),
//!                 context.short_name(),
//!                 context.migrations.len(),
//!                 context.pending_changes.len()
//!             );
//!         }
//!     }
//! }
//!
//! scanner.unload();
//! ```

pub mod classify;
pub mod config;
pub mod deps;
pub mod diff;
pub mod error;
pub mod inspector;
pub mod lifecycle;
pub mod loader;
pub mod locator;
pub mod model;
pub mod probe;
pub mod relational;
pub mod scanner;
pub mod session;
pub mod tooling;

// Re-exports
pub use classify::{ChangeClassification, classify};
pub use config::{LoaderConfig, ScannerConfig};
pub use deps::{DependencyManifest, Resolution, ResolvedDependency};
pub use diff::{DiffEntry, MigrationOperation, ModelDiffer};
pub use error::{ScanError, ScanResult};
pub use inspector::{FactoryBinding, SchemaInspector};
pub use lifecycle::{ContextTracker, UnloadReport};
pub use loader::{ContextHandle, IsolatedContext, IsolatedLoader, ModuleHandle};
pub use locator::ProjectLocator;
pub use model::{
    MigrationRecord, MigrationStatus, PendingChangeRecord, Project, SchemaContextDescriptor,
    Solution, parse_migration_id,
};
pub use probe::{
    ContextReport, InProcessChannel, InProcessLauncher, InterfaceRef, ModelChanges,
    ProbeChannel, ProbeHandler, ProbeLauncher, ProbeRequest, ProbeResponse, ProcessLauncher,
    TypeCatalog, TypeInfo,
};
pub use relational::{Column, RelationalModel, Table};
pub use scanner::SolutionScanner;
pub use session::SchemaContextSession;
pub use tooling::{MigrationTool, ToolOutput};
