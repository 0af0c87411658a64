//! # homerule-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `AutomationRepository`, `ComponentRepository` / `TriggerRepository`,
//!     `ExecutionRepository`: persistence
//!   - `FeedFacade`: the feed context seen from automations
//!   - `EventPublisher`, `Clock`, `IdGenerator`, `SunTimesSource`, `AccessPolicy`
//! - Drive automations:
//!   - `ResolverRegistry`: live data for components, one strategy per tag
//!   - `evaluate`: lazy, short-circuiting condition evaluation
//!   - `ExecutionModeArbiter`: MULTIPLE / SINGLE / REPLACE admission
//!   - `ExecutionEngine`: the execution state machine
//!   - `ExecutionResumer`: wakes due `WAITING` executions
//!   - `TriggerDispatcher`: feed, schedule, and voice stimuli to firings
//! - Define **driving/inbound ports** as use-case services for definitions
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `homerule-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod arbiter;
pub mod dispatcher;
pub mod engine;
pub mod evaluator;
pub mod event_bus;
pub mod ports;
pub mod resolver;
pub mod resumer;
pub mod services;
pub mod transition;

#[cfg(test)]
mod testing;
