//! Service worker controller for the Deeds client.
//!
//! This crate provides:
//! - [`ServiceWorker`]: install, activate, message and fetch handlers over a
//!   versioned cache bucket
//! - [`LocalContainer`]: an in-process host that drives workers through the
//!   platform lifecycle and implements [`deeds_core::WorkerContainer`]
//! - [`BackgroundTasks`]: tracked fire-and-forget cache writes
//! - Prometheus counters for routing and cache maintenance

pub mod background;
pub mod container;
pub mod error;
pub mod metrics;
pub mod network;
pub mod worker;

pub use background::BackgroundTasks;
pub use container::{InstallOutcome, LocalContainer};
pub use error::{NetworkError, WorkerError, WorkerResult};
pub use network::Network;
pub use worker::{ActivateReport, InstallReport, ServiceWorker};
