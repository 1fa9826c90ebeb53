//! Backend HTTP API

pub mod client;
pub mod directory;

pub use client::ApiClient;
pub use directory::HttpKeyDirectory;
