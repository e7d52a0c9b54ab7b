// Skywatch Infrastructure - HTTP Adapter
// Implements: ExportTransport

mod http_transport;

pub use http_transport::{classify_status, HttpExportTransport, DEFAULT_REQUEST_TIMEOUT};
