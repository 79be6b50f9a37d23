// Job lifecycle: drives the upscaler passes of one job and publishes its events
use super::classifier::{classify, OutputLine};
use super::command_builder::{self, EngineConfig, InvocationDescriptor};
use super::path_resolver::{self, display_path, OutputDirectoryOverrides, OutputTarget, ResolvedPaths};
use super::registry::{JobRegistry, JobTicket};
use crate::error::{ConfigurationError, Result, UpscaylError};
use crate::models::{EventSink, JobId, JobState, Settings, UpscaleEvent, UpscaleMode, UpscaleRequest};
use crate::process_manager::{self, ProcessEvent, ProcessExit, ProcessHandle, RunningProcess};
use log::{debug, error, info, warn};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Starts engine processes. The default implementation spawns real processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, descriptor: &InvocationDescriptor) -> RunningProcess;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, descriptor: &InvocationDescriptor) -> RunningProcess {
        process_manager::start(descriptor)
    }
}

/// Everything decided before a job starts. Built once; never recomputed mid-job.
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub job_id: JobId,
    pub request: UpscaleRequest,
    pub paths: ResolvedPaths,
    /// One descriptor per pass, in execution order
    pub passes: Vec<InvocationDescriptor>,
}

/// Validate the request, resolve its paths, create the output directory and build
/// every pass invocation. Any error here means no process is started.
pub fn plan_job(request: UpscaleRequest, settings: &Settings, engine: &EngineConfig) -> Result<JobPlan> {
    let request = request.normalized(settings.no_image_processing);

    if let Some(quality) = request.output_format.compression_quality() {
        if quality > 100 {
            return Err(ConfigurationError::InvalidCompression(quality).into());
        }
    }
    command_builder::model_family(&request.model)?;

    let paths = path_resolver::resolve(&request, &OutputDirectoryOverrides::from(settings))?;
    if !paths.output_exists {
        prepare_output_dir(&paths.output)?;
    }
    let source = Path::new(&request.source_path);
    let output = paths.output.path();

    let passes = match request.mode {
        UpscaleMode::Single | UpscaleMode::Batch => {
            vec![command_builder::build(source, output, &request, engine)?]
        }
        UpscaleMode::DoublePass => {
            // Second pass upscales the first pass's output in place
            let first = command_builder::build(source, output, &request, engine)?;
            let second = command_builder::build(output, output, &request, engine)?;
            vec![first, second]
        }
    };

    Ok(JobPlan {
        job_id: crate::models::new_job_id(),
        request,
        paths,
        passes,
    })
}

fn prepare_output_dir(output: &OutputTarget) -> Result<()> {
    let dir = match output {
        OutputTarget::Directory(dir) => dir.as_path(),
        OutputTarget::File(file) => match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => return Ok(()),
        },
    };
    fs::create_dir_all(dir).map_err(|e| {
        ConfigurationError::UnusableOutputDirectory {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Final result of a controller run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: JobId,
    pub state: JobState,
    pub is_alpha_channel: bool,
    pub passes_started: usize,
}

#[derive(Debug, PartialEq)]
enum PassOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

enum Terminal {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Cancels the pass's process on every exit path; a no-op once it has exited.
struct ActiveProcess(ProcessHandle);

impl Drop for ActiveProcess {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Removes the job from the registry even if the controller is dropped mid-run.
struct Registration {
    registry: Arc<JobRegistry>,
    job_id: JobId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.job_id);
    }
}

pub struct JobController {
    plan: JobPlan,
    ticket: JobTicket,
    registry: Arc<JobRegistry>,
    sink: Arc<dyn EventSink>,
    launcher: Arc<dyn ProcessLauncher>,
    state: JobState,
    is_alpha_channel: bool,
    passes_started: usize,
}

impl JobController {
    pub fn new(
        plan: JobPlan,
        ticket: JobTicket,
        registry: Arc<JobRegistry>,
        sink: Arc<dyn EventSink>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            plan,
            ticket,
            registry,
            sink,
            launcher,
            state: JobState::Pending,
            is_alpha_channel: false,
            passes_started: 0,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn job_id(&self) -> &str {
        &self.ticket.job_id
    }

    fn stop_observed(&self) -> bool {
        self.ticket.cancellation.is_cancelled() || self.registry.is_stop_requested(self.ticket.generation)
    }

    fn transition(&mut self, next: JobState) {
        if !self.state.can_transition_to(next) {
            warn!(
                "Job {}: ignoring transition {:?} -> {:?}",
                self.job_id(),
                self.state,
                next
            );
            return;
        }
        debug!("Job {}: {:?} -> {:?}", self.job_id(), self.state, next);
        self.state = next;
    }

    fn emit(&self, event: UpscaleEvent) {
        if self.state.is_terminal() {
            return;
        }
        self.sink.emit(event);
    }

    /// Record the terminal state exactly once. A stop observed before this point wins
    /// over success or failure.
    fn finish(&mut self, terminal: Terminal) {
        if self.state.is_terminal() {
            return;
        }
        let terminal = match terminal {
            Terminal::Cancelled => Terminal::Cancelled,
            _ if self.stop_observed() => Terminal::Cancelled,
            other => other,
        };

        self.registry.unregister(&self.ticket.job_id);
        let job_id = self.ticket.job_id.clone();
        let event = match terminal {
            Terminal::Succeeded => {
                let output_path = display_path(self.plan.paths.output.path());
                info!("Job {} done: {}", job_id, output_path);
                self.transition(JobState::Succeeded);
                UpscaleEvent::Done { job_id, output_path }
            }
            Terminal::Failed(message) => {
                error!("Job {} failed: {}", job_id, message);
                self.transition(JobState::Failed);
                UpscaleEvent::Error { job_id, message }
            }
            Terminal::Cancelled => {
                info!("Job {} cancelled", job_id);
                self.transition(JobState::Cancelled);
                UpscaleEvent::Cancelled { job_id }
            }
        };
        self.sink.emit(event);
    }

    /// Run the job to a terminal state.
    pub async fn run(mut self) -> JobReport {
        let _registration = Registration {
            registry: self.registry.clone(),
            job_id: self.ticket.job_id.clone(),
        };
        let started = Instant::now();

        if self.plan.paths.output_exists {
            info!(
                "Job {}: already upscaled at {:?}",
                self.job_id(),
                self.plan.paths.output.path()
            );
            self.finish(Terminal::Succeeded);
            return self.report();
        }

        let passes = self.plan.passes.clone();
        for (index, descriptor) in passes.iter().enumerate() {
            let pass = (index + 1) as u8;
            if self.stop_observed() {
                self.finish(Terminal::Cancelled);
                return self.report();
            }

            info!(
                "Job {}: starting pass {}/{}: {}",
                self.job_id(),
                pass,
                passes.len(),
                descriptor.command_line()
            );
            let process = self.launcher.launch(descriptor);
            self.passes_started += 1;
            self.registry.register(&self.ticket.job_id, process.handle.clone());
            self.transition(JobState::Running);

            match self.drive_pass(pass, process).await {
                PassOutcome::Completed => {
                    debug!("Job {}: pass {} completed", self.job_id(), pass);
                }
                PassOutcome::Failed(message) => {
                    self.finish(Terminal::Failed(message));
                    return self.report();
                }
                PassOutcome::Cancelled => {
                    self.finish(Terminal::Cancelled);
                    return self.report();
                }
            }
        }

        if !self.plan.request.skip_post_processing && !self.stop_observed() {
            self.transition(JobState::ScalingAndConverting);
            self.emit(UpscaleEvent::PostProcessing {
                job_id: self.ticket.job_id.clone(),
            });
        }

        debug!("Job {}: finished in {:?}", self.job_id(), started.elapsed());
        self.finish(Terminal::Succeeded);
        self.report()
    }

    async fn drive_pass(&mut self, pass: u8, process: RunningProcess) -> PassOutcome {
        let RunningProcess { handle, mut events } = process;
        let active = ActiveProcess(handle);
        let cancellation = self.ticket.cancellation.clone();
        let mut pid_recorded = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancellation.cancelled() => None,
                event = events.recv() => Some(event),
            };

            // A queued event must not beat a cancellation that is already recorded
            if self.stop_observed() {
                active.0.cancel();
                return PassOutcome::Cancelled;
            }

            if !pid_recorded && active.0.pid().is_some() {
                self.registry.update_pid(&self.ticket.job_id, active.0.pid());
                pid_recorded = true;
            }

            let event = match next {
                Some(Some(event)) => event,
                // Stream closed without an exit event: the process was killed from outside
                Some(None) | None => {
                    return PassOutcome::Failed("upscaler process was terminated".to_string());
                }
            };

            match event {
                ProcessEvent::Line(line) => {
                    debug!("[{} pass {}] {}", self.ticket.job_id, pass, line);
                    match classify(&line) {
                        OutputLine::FailureSignal => {
                            // The engine may keep running after reporting a failure
                            active.0.cancel();
                            return PassOutcome::Failed(line);
                        }
                        OutputLine::AlphaWarning => {
                            info!("Job {}: input has an alpha channel", self.ticket.job_id);
                            self.is_alpha_channel = true;
                            self.emit_log(line);
                        }
                        OutputLine::Progress(progress) => {
                            self.emit(UpscaleEvent::Progress {
                                job_id: self.ticket.job_id.clone(),
                                pass,
                                progress,
                            });
                        }
                        OutputLine::Info => self.emit_log(line),
                    }
                }
                ProcessEvent::Exited(ProcessExit::ExitedCleanly) => return PassOutcome::Completed,
                ProcessEvent::Exited(ProcessExit::ExitedWithSignal { code }) => {
                    let message = match code {
                        Some(code) => format!("upscaler exited with code {}", code),
                        None => "upscaler was terminated by a signal".to_string(),
                    };
                    return PassOutcome::Failed(message);
                }
                ProcessEvent::Exited(ProcessExit::FailedToLaunch { reason }) => {
                    return PassOutcome::Failed(UpscaylError::Launch(reason).to_string());
                }
            }
        }
    }

    fn emit_log(&self, line: String) {
        self.emit(UpscaleEvent::Log {
            job_id: self.ticket.job_id.clone(),
            line,
        });
    }

    fn report(&self) -> JobReport {
        JobReport {
            job_id: self.ticket.job_id.clone(),
            state: self.state,
            is_alpha_channel: self.is_alpha_channel,
            passes_started: self.passes_started,
        }
    }
}
