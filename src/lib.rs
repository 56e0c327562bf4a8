pub mod app_check;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logger;
pub mod object;
pub mod schema;
pub mod types;
pub mod wrapper;

pub use error::{map_error, ApiError, ErrorResponse};
pub use logger::get_logger;
pub use object::flatten_object;
pub use wrapper::{http_handler, Endpoint, HandlerConfig, Reply, RequestContext};
