// src/client/tests/mod.rs

mod fdsn_tests;
mod usgs_async_tests;

pub(crate) const USGS_URL: &str = "https://usgs.test/fdsnws/event/1";
pub(crate) const IRIS_URL: &str = "https://iris.test";
