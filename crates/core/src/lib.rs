//! Core domain types for the Deeds client update and cache lifecycle.
//!
//! This crate defines the data model shared by the worker and page crates:
//! - Configuration (cache version, routes, guard tuning)
//! - Intercepted requests, responses, and resource classification
//! - The worker lifecycle state machine
//! - The page <-> worker message protocol and the container seam
//! - Persisted key names and the wall clock seam

pub mod clock;
pub mod config;
pub mod container;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod message;
pub mod request;
pub mod route;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use container::WorkerContainer;
pub use error::{Error, Result};
pub use lifecycle::{RegistrationInfo, WorkerHandle, WorkerId, WorkerState};
pub use message::{ContainerEvent, WorkerMessage};
pub use request::{Destination, Request, RequestMode, Response};
pub use route::{ResourceClass, classify};
