mod common;
mod config;
mod ops;
