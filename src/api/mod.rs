//! HTTP access to the ToolShare backend and the image host.

mod client;
#[cfg(test)]
pub(crate) mod mock;
mod transport;
pub mod upload;

pub use client::ApiClient;
pub use transport::{
    error_message, ApiRequest, ApiResponse, BearerToken, HttpTransport, Method, Transport,
};
pub use upload::{ImageUploader, ImgbbUploader, PendingImage};
