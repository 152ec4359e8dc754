pub mod bulk;
pub mod config;
pub mod job;
pub mod launch;
pub mod list;
pub mod output;
pub mod terminate;

pub use config::HelperConfig;
