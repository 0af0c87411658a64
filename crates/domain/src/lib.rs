//! # homerule-domain
//!
//! Pure domain model for the homerule automation engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Components** (triggers, conditions, actions) and their configuration variants
//! - Define **Automations** (trigger → condition tree → ordered actions, plus an execution mode)
//! - Define **Executions** (the persisted, resumable run state machine)
//! - Define the **Specification** algebra used for condition trees and execution queries
//! - Define **Feeds** and **Events**
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod automation;
pub mod comparison;
pub mod event;
pub mod execution;
pub mod feed;
pub mod specification;
