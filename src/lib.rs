//! # Drop Stats
//!
//! Backend for a community drop statistics service: aggregates
//! player-submitted drop reports into per-stage drop rates, time-bucketed
//! trends and multi-item drop patterns.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (servers, stages, items, time ranges,
//!   reports, matrix/trend/pattern shapes)
//! - **repo**: Capability seams over the external stores, with in-memory
//!   implementations
//! - **storage**: Filesystem data lake operations (JSONL)
//! - **cache**: Two-level keyed cache with single-flight recomputation
//! - **engine**: The analytics core (drop matrix, trend, pattern matrix,
//!   recompute scheduler)
//! - **shim**: Projection of internal results to the public wire format
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod models;
pub mod repo;
pub mod shim;
pub mod storage;
