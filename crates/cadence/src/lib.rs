pub mod agent;
pub mod configuration;
pub mod conversation;
pub mod errors;
pub mod markup;
pub mod models;
pub mod providers;
pub mod tools;
