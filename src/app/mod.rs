pub mod application;
pub mod cache;
pub mod cli;
pub mod credential;
pub mod fetcher;
pub mod key;
pub mod runner;
