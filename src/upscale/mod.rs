// Upscale job orchestration
pub mod classifier;
pub mod command_builder;
pub mod controller;
pub mod path_resolver;
pub mod registry;

pub use classifier::{classify, OutputLine};
pub use command_builder::{EngineConfig, InvocationDescriptor, ModelFamily};
pub use controller::{plan_job, JobController, JobPlan, JobReport, ProcessLauncher, SystemLauncher};
pub use path_resolver::{OutputDirectoryOverrides, OutputTarget, ResolvedPaths};
pub use registry::{JobCancellation, JobRegistry, JobTicket};
