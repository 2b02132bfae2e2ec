//! Platform API clients

pub mod client;
pub mod github;
pub mod graph;
pub mod vercel;

/// Percent-encode a query parameter value
pub fn encode_query(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
