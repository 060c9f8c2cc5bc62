//! Shared test utilities for worker integration tests.

#![allow(dead_code)]

pub mod mocks;

use deeds_core::config::AppConfig;
use deeds_core::Request;
use deeds_storage::CacheStorage;
use deeds_worker::{LocalContainer, Network};
use std::sync::Arc;

pub const ORIGIN: &str = "https://deeds.example.test";

pub fn request(path: &str) -> Request {
    Request::for_path(ORIGIN, path).unwrap()
}

pub fn navigation(path: &str) -> Request {
    Request::navigate(&format!("{ORIGIN}{path}")).unwrap()
}

pub fn container(caches: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> LocalContainer {
    LocalContainer::new(AppConfig::for_testing(), caches, network)
}
