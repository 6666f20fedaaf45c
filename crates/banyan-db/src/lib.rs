//! Typed PostgreSQL access for the task graph, execution attempts, and
//! identity store. Every function here is a thin, single-statement wrapper
//! around `sqlx`; sequencing multiple calls into a coherent operation (e.g.
//! "acquire the lock, then transition, then release continuations") is
//! `banyan-core`'s job.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
