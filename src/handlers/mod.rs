pub mod account_handlers;
pub mod health_handlers;
