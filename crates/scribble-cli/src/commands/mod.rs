pub mod common;
pub mod completions;
pub mod folder;
pub mod page;
pub mod queue;
pub mod status;
pub mod sync;
pub mod watch;
