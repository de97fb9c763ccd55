//! HTTP transport and control plane paths

pub mod client;
pub mod deployments;
