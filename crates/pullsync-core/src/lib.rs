pub mod config;
pub mod logging;

pub mod autoqueue;
pub mod controller;
pub mod engine;
pub mod extract;
pub mod job_status;
pub mod model;
pub mod retry;
pub mod scanner;
pub mod status_parser;
