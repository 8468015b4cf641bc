pub mod auth;
pub mod cloud;
pub mod health;
pub mod security;
pub mod telemetry;
