pub mod common;
pub mod completions;
pub mod conflicts;
pub mod delete;
pub mod edit;
pub mod list;
pub mod new;
pub mod sync;
pub mod watch;
