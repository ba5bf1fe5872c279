mod envelope;
mod project;

pub use envelope::*;
pub use project::*;
