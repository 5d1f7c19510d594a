pub mod commands;
pub mod middleware;
pub mod platform;
pub mod policy;
pub mod routes;
pub mod telegram;
