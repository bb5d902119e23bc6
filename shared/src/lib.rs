/// Shared building blocks for the Terarelay crates.
///
/// Holds the resolution data model, the error taxonomy, configuration
/// structs and the task tracking queue used by the worker pool.
pub mod config;
pub mod errors;
pub mod models;
pub mod task_queue;
