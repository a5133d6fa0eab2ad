//! Storage layer for Recall

pub mod db;
pub mod models;

pub use db::Database;
pub use models::*;
