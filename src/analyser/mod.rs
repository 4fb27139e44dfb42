//! Local half of the client: turning captures, flow logs and plain tables into the
//! feature tables the classification service expects.
pub mod capture;
pub mod containers;
pub mod core;
pub mod error;
pub mod flow;
pub mod generate;
pub mod sample;
pub mod select;
pub mod table;
pub mod utils;
