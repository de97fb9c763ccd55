//! Deployment options and the handle returned by a deployment

pub mod handle;
pub mod options;
