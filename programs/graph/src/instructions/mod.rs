pub mod add_relation;
pub mod disconnect_relation;
pub mod initialize_controller;
pub mod initialize_provider;
pub mod initialize_tree;
pub mod verify_relation;

pub use add_relation::*;
pub use disconnect_relation::*;
pub use initialize_controller::*;
pub use initialize_provider::*;
pub use initialize_tree::*;
pub use verify_relation::*;
