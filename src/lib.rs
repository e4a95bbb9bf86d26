pub mod handlers;
pub mod models;
pub mod router;
pub mod server;
pub mod store;
pub mod validator;

pub use server::{build_app, AppState};
