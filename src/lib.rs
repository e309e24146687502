pub mod config;
pub mod error;
pub mod mcp;
pub mod perplexity;
pub mod proxy;
pub mod tools;
pub mod utils;

pub use config::Config;
pub use error::{McpError, McpResult};
