pub mod config;
mod config_env;
pub mod controller;
pub mod directives;
pub mod directory;
pub mod itinerary;
pub mod llm;
pub mod models;
pub mod persistence;
pub mod planning;
pub mod repos;
pub mod schedule;
pub mod search;
pub mod session;
