//! Middleware for request ID tracking, logging, timeouts and error mapping.

mod error_handler;
mod logging;
mod request_id;
mod timeout;

pub use logging::logging_middleware;
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use timeout::timeout_middleware;
