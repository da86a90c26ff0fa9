pub mod qc_client;

pub use qc_client::{QcClient, QcRequest, QcResponse, DEFAULT_ANALYZE_DEADLINE};
