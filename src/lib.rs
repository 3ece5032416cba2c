// src/lib.rs

pub mod blockchain;
pub mod cli;
pub mod core;
pub mod network;
pub mod security;
pub mod service;
pub mod storage;
pub mod tools;
