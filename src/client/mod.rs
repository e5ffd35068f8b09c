//! Rate-limited client for the document registration API.

mod api;
mod transport;

pub use api::CrptApi;
pub use transport::{ApiResponse, HttpTransport, Transport, TransportRequest};
