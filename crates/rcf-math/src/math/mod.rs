//! Core math modules.

pub mod moments;
pub mod stable;
pub mod window;
