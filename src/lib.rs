#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod logging;
pub mod output;
pub mod scheduler;
