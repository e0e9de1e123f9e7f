//! Container control plane for benchrig
//!
//! The run engine only talks to containers through [`ContainerEngine`];
//! [`DockerCli`] implements it with the docker command-line client.

pub mod cli;
pub mod engine;
pub mod error;

pub use cli::DockerCli;
pub use engine::{ContainerEngine, ContainerState, Readiness};
pub use error::DockerError;
