pub mod auth;
pub mod chat_completions;
pub mod health;
pub mod messages;
pub mod models;
pub mod routes;
mod support;

pub use routes::create_router;
