pub mod balance;
pub mod bots;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod logging;
pub mod objective;
pub mod rng;
pub mod roster;
pub mod runtime;
pub mod server_protocol;
pub mod server_utils;
pub mod sim;
pub mod tasks;
pub mod timers;
pub mod types;
pub mod world;
