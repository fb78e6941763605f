//! Webmail archiver: bounded-window export of a webmail folder to `.eml` files.

pub mod catalog;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod error;
pub mod retrieval;
pub mod session;
pub mod store;
pub mod webmail;
pub mod window;
