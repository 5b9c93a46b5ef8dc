pub mod cli;
pub mod dispatch;
pub mod envelope;
pub mod executor;
pub mod journal;
pub mod modules;
pub mod registry;
pub mod resolver;
pub mod shared;
