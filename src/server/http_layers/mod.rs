mod request_id;
mod requests_logging;

pub use request_id::{assign_request_id, RequestId, REQUEST_ID_HEADER};
pub use requests_logging::{log_requests, RequestsLoggingLevel};
