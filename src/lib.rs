pub mod auth;
pub mod calendar;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod engine;
pub mod http;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod slot;
pub mod wal;
