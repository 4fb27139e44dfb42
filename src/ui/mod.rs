pub mod interactive;
pub mod output;
pub mod report;
