mod api_key;
mod artwork_routes;
pub mod config;
mod error_response;
mod http_layers;
pub mod metrics;
pub mod server;
pub mod state;
mod upload_routes;

pub use api_key::HEADER_API_KEY;
pub use config::ServerConfig;
pub use error_response::ApiError;
pub use http_layers::*;
pub use server::{make_app, run_server};
