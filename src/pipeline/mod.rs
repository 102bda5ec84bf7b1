pub mod cancel;
pub mod chain;
pub(crate) mod config;
pub mod pipe;
pub mod retry;
pub mod runtime;
