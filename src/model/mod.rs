pub mod client_message;
pub mod game;
pub mod quiz;
pub mod server_message;
