pub mod engine;

pub use engine::GuessEngine;
