pub mod connect;
pub mod health;
