pub mod anthropic;
pub mod base;
pub mod configs;
pub mod errors;
pub mod factory;
pub mod gateway;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod utils;
