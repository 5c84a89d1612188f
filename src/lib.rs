pub mod catalog;
pub mod cli;
pub mod colors;
pub mod config;
pub mod error;
pub mod events;
pub mod fsutil;
pub mod installer;
pub mod lockfile;
pub mod manifest;
pub mod ops;
pub mod project;
pub mod resolver;
#[cfg(test)]
pub mod tests;
