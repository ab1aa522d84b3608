//! OKR planner: turns an objective into key results, epics, features,
//! stories and tasks, one reviewable stage at a time, and pushes the
//! finished plan to an issue tracker.

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod reasoning;
pub mod store;
pub mod tracker;
pub mod validator;
