pub mod audit;
pub mod handlers;
pub mod pipeline;
pub mod routes;
pub mod tasks;

pub use routes::create_router;
