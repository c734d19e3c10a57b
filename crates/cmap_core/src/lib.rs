pub use rusqlite;

pub mod db;
pub mod domain;
pub mod error;
pub mod repo;
