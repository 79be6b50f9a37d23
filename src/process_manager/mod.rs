pub mod upscayl_process;

pub use upscayl_process::*;
