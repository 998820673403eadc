pub mod auth;
pub mod responses;
pub mod router;
mod state;

pub use state::AppState;
