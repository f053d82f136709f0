pub mod api;
pub mod config;
pub mod humanize;
pub mod hub;
pub mod observability;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod worker;
