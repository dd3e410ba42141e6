//! Periodical Distiller - turns harvested newspaper issues into sealed
//! archival packages.
//!
//! This library crate exposes the stages and the orchestrator for the binary
//! and for integration testing. The durable bucket engine lives in
//! `distiller_kanban`.

pub mod collaborators;
pub mod config;
pub mod orchestrator;
pub mod stages;
