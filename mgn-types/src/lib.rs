pub mod server;
pub mod filter;
pub mod bulk;
pub mod job;

pub use server::*;
pub use filter::*;
pub use bulk::*;
pub use job::*;
