//! Vespa Deployer Library
//!
//! Packages Vespa applications and deploys them to a local container or to
//! the managed cloud.

pub mod app;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod output;
pub mod package;
pub mod storage;
pub mod utils;

