// src/services/mod.rs

pub mod code_allocator;
pub mod ledger;
pub mod lifecycle;
pub mod question_bank;
pub mod results;
