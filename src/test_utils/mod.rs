//! Shared test helpers: an in-process mock of the API and log capture.

mod logs;
mod mock_api;

pub(crate) use logs::capture_logs;
pub(crate) use mock_api::{MockApi, TAKEN_EMAIL, spawn_mock_api};
