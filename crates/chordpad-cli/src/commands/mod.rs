pub mod checkpoint;
pub mod common;
pub mod completions;
pub mod config;
pub mod drafts;
pub mod edit;
pub mod maintenance;
pub mod record;
pub mod recover;
pub mod save;
