pub mod game_timer;
pub mod handler;
pub mod heartbeat;
pub mod http;
pub mod model;
pub mod persistence;
pub mod scoring;
pub mod server;
