//! HTTP surface: browsing, checkout, and operator routes over the engine.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
