//! Resource client for the cloud API
//!
//! Thin layer over the credential cache and the operation tracker:
//! `list`/`read` REST collections, issue mutating calls that start an
//! activity, and wait for those activities (or backup jobs) to finish.

pub mod client;
pub mod resource;

pub use client::{PersonalAccessToken, ResourceClient};
pub use cloud_activity::{Error, Operation, OperationKind, PollConfig, Result};
pub use resource::{Filter, NameFilter, ResourceKind, VirtualMachineFilter};
