pub mod clipboard;
pub mod connection_registry;
pub mod driver;
pub mod query_job;
pub mod results_grid;
pub mod settings;
pub mod store;
pub mod text_buffer;
pub mod tree;
