pub mod cache;
pub mod entities;
pub mod node;
pub mod protocol;
pub mod store;
pub mod types;

pub use node::Node;
pub use node::NodeRpc;
