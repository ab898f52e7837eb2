pub mod context;
pub mod instance;
pub mod processor;
