pub mod app_state;
pub mod auth_middleware;
pub mod rest_api;
pub mod router;
