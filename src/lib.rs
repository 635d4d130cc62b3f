pub mod catalog;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod offline;
pub mod output;
