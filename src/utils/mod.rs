//! Utility helpers: plain-text table rendering.
pub mod table;

pub use table::{render_table, TableOptions};
