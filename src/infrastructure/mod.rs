pub mod http_transport;

pub use http_transport::{
    FilePart, HttpTransport, Method, RequestBody, Transport, WireRequest, WireResponse,
};
