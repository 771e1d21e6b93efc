// src/handlers/mod.rs

pub mod live;
pub mod questions;
pub mod sessions;
