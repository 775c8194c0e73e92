pub mod cache;
pub mod discovery;
pub mod export;
pub mod orchestrator;
pub mod render;
pub mod transcribe;
