pub mod clustering;
pub mod config;
pub mod cosine;
pub mod engine;
pub mod error;
pub mod features;
pub mod index;
pub mod protocol;
pub mod recommendation;
pub mod server;
pub mod store;
pub mod transport;
pub mod types;
pub mod vectorizer;
