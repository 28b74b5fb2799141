//! Capstan Orchestration Engine
//!
//! This crate turns a deployment into an ordered action plan and runs it to
//! completion: one task at a time per deployment, state persisted around
//! every provider call, transient failures retried, progress streamed as
//! events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  TaskRunner                          │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │             build_plan                      │    │
//! │  │   Toggle-gated actions in a fixed order     │    │
//! │  └─────────────────────────────────────────────┘    │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │             TaskStore                       │    │
//! │  │   Persist before and after each step        │    │
//! │  └─────────────────────────────────────────────┘    │
//! │                      │                               │
//! │                      ▼                               │
//! │  ┌─────────────────────────────────────────────┐    │
//! │  │          TaskEvent Stream                   │    │
//! │  │   Started | Progress | Completed | Failed   │    │
//! │  └─────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use capstan_orchestrator::{MemoryTaskStore, TaskRunner};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryTaskStore::new());
//! let runner = TaskRunner::new(store, providers);
//!
//! let task = runner.start(&deployment).await?;
//! println!("poll task {}", task.id);
//! ```

pub mod error;
pub mod plan;
pub mod runner;
pub mod store;

pub use error::{OrchestratorError, Result};
pub use plan::{build_plan, ActionPlan, PlanError};
pub use runner::{TaskEvent, TaskRunner};
pub use store::{MemoryTaskStore, StoreError, TaskStore};
