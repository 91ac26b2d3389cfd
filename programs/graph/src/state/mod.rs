pub mod controller;
pub mod merkle;
pub mod provider;
pub mod relation;
pub mod tree;

pub use controller::*;
pub use merkle::*;
pub use provider::*;
pub use relation::*;
pub use tree::*;
