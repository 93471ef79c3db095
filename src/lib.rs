pub mod config;
pub mod internal;
pub mod syntax;
pub mod utils;
pub mod vfs;
