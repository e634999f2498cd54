pub mod document;
pub mod engine;
pub mod verify;

pub use engine::PatchEngine;
pub use verify::verify_fixes;
