//! CLI commands implementation

pub mod browse;
pub mod cleanup;
pub mod downloads;
pub mod init;
pub mod status;
pub mod tags;

pub use browse::*;
pub use cleanup::*;
pub use downloads::*;
pub use init::*;
pub use status::*;
pub use tags::*;
