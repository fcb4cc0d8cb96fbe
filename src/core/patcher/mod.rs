pub mod apply;
pub mod tool;

pub use apply::PatchOrchestrator;
pub use tool::PatchTool;
