// Data models (structs)
pub mod events;
pub mod job;
pub mod settings;
pub mod upscale;

pub use events::*;
pub use job::*;
pub use settings::*;
pub use upscale::*;
