// src/lib.rs

//! Course availability notifier library

pub mod channels;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
