pub mod auth;
pub mod server;

pub use server::{AppState, build_router, run};
