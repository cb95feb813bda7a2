//! Runtime-side container and volume records.

mod state;

pub use state::{ContainerInfo, ContainerState, VolumeInfo};
