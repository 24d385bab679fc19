pub mod core;
pub mod expander;
pub mod loader;

pub use self::core::{Compiler, parse_timer};
