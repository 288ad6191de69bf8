pub mod composite;
pub mod handlers;
