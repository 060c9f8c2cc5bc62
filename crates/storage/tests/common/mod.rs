pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{request, seeded_body};
