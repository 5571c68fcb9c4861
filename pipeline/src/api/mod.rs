pub mod auth;
pub mod models;
pub mod rate_limit;
pub mod routes;

pub use routes::routes;
