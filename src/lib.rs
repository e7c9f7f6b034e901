pub mod config;
pub mod fetch_error;
pub mod fetcher;
pub mod importers;
pub mod pipeline;
pub mod stages;
pub mod table;
pub mod timestamp;
pub mod validator;
