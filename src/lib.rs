//! `caweb_migrate`: an atomic, multi-version migration engine that moves a
//! running service between two independent Postgres-compatible databases,
//! translating both the relational schema (via FDW-backed view chains
//! settled into tables) and the service's own YAML configuration file in
//! one destination transaction.
//!
//! See [`orchestrator::migrate`] for the entry point driving the whole
//! operation; [`settings::Settings`] for the version-erased config facade;
//! [`snapshot::SnapshotHandle`] for the process-wide read model a host
//! service keeps refreshed across migrations and live settings updates.

pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod role;
pub mod scram;
pub mod schema_migration;
pub mod settings;
pub mod snapshot;
pub mod version;
