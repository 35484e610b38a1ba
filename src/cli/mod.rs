pub mod args;
pub mod commands;
pub mod root;

pub use args::{Args, Commands, DatasetAction, OutputFormat, SignatureAction};
pub use root::RootCommand;
