// Command handlers - one file per domain
pub mod settings;
pub mod upscale;

pub use upscale::UpscaylService;
