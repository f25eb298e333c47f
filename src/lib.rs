pub mod accessions;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod srr;
pub mod store;
pub mod worker;
