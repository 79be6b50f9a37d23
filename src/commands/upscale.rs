// Upscale entry points used by the UI layer
use crate::error::{Result, UpscaylError};
use crate::models::{EventSink, JobId, JobSummary, Settings, UpscaleEvent, UpscaleRequest};
use crate::upscale::command_builder::{list_custom_models, DEFAULT_MODELS, DIRECTORY_MODELS};
use crate::upscale::{plan_job, EngineConfig, JobController, JobRegistry, ProcessLauncher, SystemLauncher};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;

pub struct UpscaylService {
    registry: Arc<JobRegistry>,
    sink: Arc<dyn EventSink>,
    launcher: Arc<dyn ProcessLauncher>,
    settings: RwLock<Settings>,
}

impl UpscaylService {
    pub fn new(settings: Settings, sink: Arc<dyn EventSink>) -> Self {
        Self::with_launcher(settings, sink, Arc::new(SystemLauncher))
    }

    pub fn with_launcher(
        settings: Settings,
        sink: Arc<dyn EventSink>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            sink,
            launcher,
            settings: RwLock::new(settings),
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Replace the settings used by future submissions. Running jobs keep theirs.
    pub fn set_settings(&self, settings: Settings) {
        *self.settings.write() = settings;
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Validate and start a job, returning immediately. Progress and the outcome
    /// arrive through the event sink.
    ///
    /// Configuration problems are returned here and no process is started. Must be
    /// called from within a Tokio runtime.
    pub fn submit_upscale_request(&self, request: UpscaleRequest) -> Result<JobId> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| UpscaylError::Launch(format!("no async runtime available: {}", e)))?;

        let settings = self.settings();
        let engine = EngineConfig::from_settings(&settings);
        let plan = plan_job(request, &settings, &engine)?;
        let job_id = plan.job_id.clone();

        debug!(
            "Submitting job {} ({:?}) for {}: {:?}",
            job_id, plan.request.mode, plan.request.source_path, plan.paths.output
        );

        let ticket = self.registry.track(JobSummary {
            id: job_id.clone(),
            mode: plan.request.mode,
            source_path: plan.request.source_path.clone(),
            current_pass: 0,
            pid: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        });

        let controller = JobController::new(
            plan,
            ticket,
            self.registry.clone(),
            self.sink.clone(),
            self.launcher.clone(),
        );
        runtime.spawn(controller.run());

        Ok(job_id)
    }

    pub fn cancel_job(&self, job_id: &str) -> bool {
        let cancelled = self.registry.cancel_job(job_id);
        if !cancelled {
            debug!("Cancel requested for unknown or finished job {}", job_id);
        }
        cancelled
    }

    /// Stop every running job and publish the global stop notice.
    pub fn cancel_all_jobs(&self) -> usize {
        let cancelled_jobs = self.registry.cancel_all();
        info!("Stop requested, cancelled {} job(s)", cancelled_jobs);
        self.sink.emit(UpscaleEvent::Stopped { cancelled_jobs });
        cancelled_jobs
    }

    pub fn list_active_jobs(&self) -> Vec<JobSummary> {
        self.registry.active_jobs()
    }

    /// Built-in models followed by those found in the custom models folder.
    pub fn list_models(&self) -> Vec<String> {
        let mut models: Vec<String> = DEFAULT_MODELS
            .iter()
            .chain(DIRECTORY_MODELS.iter())
            .map(|m| m.to_string())
            .collect();

        if let Some(dir) = self.settings().custom_models_dir() {
            match list_custom_models(&dir) {
                Ok(custom) => {
                    for model in custom {
                        if !models.contains(&model) {
                            models.push(model);
                        }
                    }
                }
                Err(e) => warn!("Ignoring custom models folder: {}", e),
            }
        }
        models
    }
}
