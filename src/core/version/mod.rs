pub mod model;
pub mod resolver;

pub use model::{validate_branch, GameVersion};
pub use resolver::VersionResolver;
