//! Minimal collaborator entities.
//!
//! This service has no separate routing layer for experiments/runs/
//! sensors/projects (`spec.md` §1 treats that as an external
//! collaborator). These modules carry just enough CRUD and lifecycle to
//! exercise the core subsystems' scope validation, membership checks, and
//! audit log — see `SPEC_FULL.md` §3.

pub mod auth;
pub mod capture_session_events;
pub mod capture_sessions;
pub mod conversion_profiles;
pub mod error;
pub mod experiments;
pub mod runs;
pub mod sensors;
