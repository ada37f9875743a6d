//! Experiment-telemetry data plane.
//!
//! Four tightly coupled subsystems sit on top of a single Postgres pool:
//! telemetry ingest (`telemetry`), the conversion backfill worker
//! (`backfill`), the webhook delivery pipeline (`webhooks`), and the
//! minimal collaborator entities (`domain`) that the other three need to
//! validate scope against (experiments, runs, capture sessions, sensors,
//! conversion profiles). See `SPEC_FULL.md` for the full component map.

pub mod api;
pub mod backfill;
pub mod config;
pub mod db;
pub mod domain;
pub mod openapi;
pub mod telemetry;
pub mod webhooks;
