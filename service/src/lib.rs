#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

pub mod app;
pub mod config;
pub mod congress;
pub mod constituents;
pub mod db;
pub mod formfill;
pub mod geocode;
pub mod messages;
pub mod rest;
pub mod states;
