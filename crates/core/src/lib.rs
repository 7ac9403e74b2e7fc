pub mod classify;
pub mod dialogs;
pub mod input;
pub mod lifecycle;
pub mod logger;
pub mod monitor;
pub mod orchestrator;
pub mod parser;
pub mod platform;
pub mod settings;
pub mod sleep;
pub mod types;
