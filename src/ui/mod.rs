pub mod canvas;
pub mod terminal;

pub use terminal::TerminalUI;
