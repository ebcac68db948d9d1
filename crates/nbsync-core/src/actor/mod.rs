//! Actor implementations

pub mod resolver;

pub use resolver::{SharedEntities, SharedEntityActor, SharedEntityActorArgs};
