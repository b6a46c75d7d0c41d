//! Background services.

pub mod bot;
pub mod retention;
