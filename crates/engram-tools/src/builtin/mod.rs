//! Built-in tools

mod calculator;
mod search;

pub use calculator::CalculatorTool;
pub use search::{SearchBackend, SearchTool};
