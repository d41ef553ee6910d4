mod commit;
mod pipeline;
pub mod store;

pub use commit::Commit;
pub use commit::Context;
pub use pipeline::Pipeline;
