pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod openai;
pub mod prompt;
pub mod publish;
pub mod scheduler;
pub mod sport_api;
