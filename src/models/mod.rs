pub mod instance;

pub use instance::{Instance, InstancePatch, InstanceView, NewInstance};
