//! tutord: back office of a small tutoring school, served as a JSON-lines
//! sidecar over stdio.

pub mod backup;
pub mod cache;
pub mod config;
pub mod db;
pub mod debounce;
pub mod finance;
pub mod generate;
pub mod insights;
pub mod ipc;
pub mod logging;
pub mod model;
pub mod nav;
pub mod payroll;
pub mod schedule;
pub mod store;
pub mod validation;
