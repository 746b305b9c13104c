// src/models/mod.rs

pub mod attempt;
pub mod olympiad;
pub mod package;
pub mod question;
pub mod user;
