//! HTTP surface: health, invite hook, and the WebSocket upgrade route

mod routes;

pub use routes::build_router;
