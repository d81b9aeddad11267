pub mod commands;
pub mod identity;
pub mod render;
