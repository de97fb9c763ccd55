//! Deployment targets

pub mod cloud;
pub mod docker;
pub mod fsm;
pub mod local;
