pub mod definition;
pub mod catalog;
pub mod records;
pub mod message;
pub mod state;
pub mod applier;
pub mod writer;
pub mod behavior;
pub mod engine;

pub use self::engine::Engine;
