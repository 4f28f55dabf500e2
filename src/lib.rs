#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod ecs;
pub mod events;
pub mod game;
pub mod net;
pub mod players;
pub mod ui;

mod app;
pub use app::BulwarkApp;
