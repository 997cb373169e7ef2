// uShadow backend API: REST client and typed errors.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
