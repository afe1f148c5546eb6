//! The request controller: one generation at a time, then a cooldown.
//!
//! State lives behind a single async mutex. The lock is only held for short
//! bookkeeping sections and never across the outbound call, so status polls
//! stay responsive while a request is in flight.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::ControllerSettings;
use crate::constants::MAX_UPLOADS;
use crate::imagen::{ImageBackend, PredictRequest};
use crate::prompt::{GenerationMode, build_request};
use crate::session::{Draft, GeneratedImage, LastResult, ResultKind, UploadedImage, Uploads};

mod cooldown;
mod outcome;

pub use outcome::Outcome;

/// Synchronous rejections from [`RequestController::submit`]. No network call
/// was made and nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The prompt (or collage description) is blank.
    EmptyPrompt,
    /// Collage mode without any uploaded photos.
    NoImages,
    /// A request is in flight or the cooldown is still running.
    GateClosed {
        /// Seconds left on the cooldown, zero while a request is in flight.
        cooldown_remaining: u64,
    },
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::EmptyPrompt => write!(f, "Please enter a prompt"),
            SubmitError::NoImages => write!(f, "Please upload at least one image for a collage"),
            SubmitError::GateClosed { .. } => {
                write!(f, "Please wait before making another request")
            }
        }
    }
}

impl std::error::Error for SubmitError {}

/// Where the controller is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// A new request may start.
    Idle,
    /// A request has been accepted and hasn't finished.
    InFlight,
    /// Waiting out a cooldown.
    CoolingDown {
        /// Seconds until the gate reopens.
        remaining: u64,
    },
}

impl Phase {
    /// The request gate: open only when idle.
    pub fn is_open(self) -> bool {
        matches!(self, Phase::Idle)
    }

    /// Seconds left on the cooldown, zero outside one.
    pub fn cooldown_remaining(self) -> u64 {
        match self {
            Phase::CoolingDown { remaining } => remaining,
            _ => 0,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    draft: Draft,
    uploads: Uploads,
    phase: Phase,
    last_result: Option<LastResult>,
    result_version: u64,
    cooldown: Option<AbortHandle>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            draft: Draft::default(),
            uploads: Uploads::default(),
            phase: Phase::Idle,
            last_result: None,
            result_version: 0,
            cooldown: None,
        }
    }

    fn set_result(&mut self, result: Option<LastResult>) {
        self.last_result = result;
        self.result_version += 1;
    }
}

struct Shared {
    backend: Arc<dyn ImageBackend>,
    settings: ControllerSettings,
    state: Mutex<SessionState>,
}

/// Point-in-time copy of the session for rendering.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Lifecycle phase.
    pub phase: Phase,
    /// Whether a new request may start.
    pub request_gate: bool,
    /// True while a request is in flight.
    pub loading: bool,
    /// Seconds left on the cooldown.
    pub cooldown_remaining: u64,
    /// Bumped whenever the last result changes.
    pub result_version: u64,
    /// The last result, if any.
    pub last_result: Option<LastResult>,
    /// The form draft.
    pub draft: Draft,
    /// Uploaded photos, in order.
    pub uploads: Vec<UploadedImage>,
    /// No more uploads will be accepted.
    pub uploads_full: bool,
}

impl Snapshot {
    /// Label for the generate button.
    pub fn button_label(&self) -> String {
        button_label(self.phase)
    }

    /// What kind of result is showing.
    pub fn result_kind(&self) -> ResultKind {
        self.last_result
            .as_ref()
            .map(LastResult::kind)
            .unwrap_or(ResultKind::None)
    }
}

/// The scalar part of a [`Snapshot`], cheap enough to poll every second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateStatus {
    /// Lifecycle phase.
    pub phase: Phase,
    /// Bumped whenever the last result changes.
    pub result_version: u64,
    /// What kind of result is showing.
    pub result_kind: ResultKind,
}

impl GateStatus {
    /// Whether a new request may start.
    pub fn request_gate(&self) -> bool {
        self.phase.is_open()
    }

    /// Label for the generate button.
    pub fn button_label(&self) -> String {
        button_label(self.phase)
    }
}

pub(crate) fn button_label(phase: Phase) -> String {
    match phase {
        Phase::Idle => "Generate Image".to_string(),
        Phase::InFlight => "Generating...".to_string(),
        Phase::CoolingDown { remaining } => format!("Please wait... ({remaining}s)"),
    }
}

/// Result of adding uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadReport {
    /// Stored.
    pub accepted: usize,
    /// Dropped because the list was full.
    pub discarded: usize,
}

/// An accepted request, running in the background.
#[derive(Debug)]
pub struct InFlight {
    handle: JoinHandle<Outcome>,
}

impl InFlight {
    /// Waits for the request to finish. Dropping the handle instead lets it
    /// run to completion unobserved.
    pub async fn outcome(self) -> Outcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Generation task failed: {}", err);
                Outcome::Transport
            }
        }
    }
}

/// Mediates a single outstanding generation request and the cooldown after it.
#[derive(Clone)]
pub struct RequestController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RequestController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestController")
            .field("settings", &self.shared.settings)
            .finish_non_exhaustive()
    }
}

impl RequestController {
    /// New controller with an open gate and empty session.
    pub fn new(backend: Arc<dyn ImageBackend>, settings: ControllerSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                settings,
                state: Mutex::new(SessionState::new()),
            }),
        }
    }

    /// Records what the user typed. Never touches the gate.
    pub async fn set_draft(&self, prompt_text: &str, mode: GenerationMode) {
        let mut state = self.shared.state.lock().await;
        state.draft = Draft {
            prompt_text: prompt_text.to_string(),
            mode,
        };
    }

    /// Appends uploads, keeping at most four in insertion order.
    pub async fn add_uploads(&self, images: Vec<UploadedImage>) -> UploadReport {
        let offered = images.len();
        let mut state = self.shared.state.lock().await;
        let accepted = state.uploads.extend(images);
        let report = UploadReport {
            accepted,
            discarded: offered - accepted,
        };
        debug!(
            "Uploads: {} accepted, {} discarded, {} held",
            report.accepted,
            report.discarded,
            state.uploads.len()
        );
        report
    }

    /// How many more uploads would be kept right now.
    pub async fn upload_capacity(&self) -> usize {
        let state = self.shared.state.lock().await;
        MAX_UPLOADS.saturating_sub(state.uploads.len())
    }

    /// Drops all uploads.
    pub async fn clear_uploads(&self) {
        self.shared.state.lock().await.uploads.clear();
    }

    /// Copies the current session state.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.shared.state.lock().await;
        Snapshot {
            phase: state.phase,
            request_gate: state.phase.is_open(),
            loading: state.phase == Phase::InFlight,
            cooldown_remaining: state.phase.cooldown_remaining(),
            result_version: state.result_version,
            last_result: state.last_result.clone(),
            draft: state.draft.clone(),
            uploads: state.uploads.as_slice().to_vec(),
            uploads_full: state.uploads.is_full(),
        }
    }

    /// Gate and result bookkeeping without copying uploads or images.
    pub async fn status(&self) -> GateStatus {
        let state = self.shared.state.lock().await;
        GateStatus {
            phase: state.phase,
            result_version: state.result_version,
            result_kind: state
                .last_result
                .as_ref()
                .map(LastResult::kind)
                .unwrap_or(ResultKind::None),
        }
    }

    /// The current image, if the last result is one, with its result version.
    pub async fn result_image(&self) -> Option<(u64, Arc<GeneratedImage>)> {
        let state = self.shared.state.lock().await;
        match &state.last_result {
            Some(LastResult::Image(image)) => Some((state.result_version, Arc::clone(image))),
            _ => None,
        }
    }

    /// Starts a generation from the current draft.
    ///
    /// Validation and the gate check happen under the lock, so two racing
    /// submits can't both get through. On acceptance the gate closes, the last
    /// result is cleared and the request runs in a spawned task.
    pub async fn submit(&self) -> Result<InFlight, SubmitError> {
        let (request, mode) = {
            let mut state = self.shared.state.lock().await;
            let request = build_request(
                state.draft.mode,
                &state.draft.prompt_text,
                state.uploads.len(),
                &self.shared.settings,
            )?;
            if !state.phase.is_open() {
                return Err(SubmitError::GateClosed {
                    cooldown_remaining: state.phase.cooldown_remaining(),
                });
            }
            state.phase = Phase::InFlight;
            state.set_result(None);
            (request, state.draft.mode)
        };

        info!("Generation accepted ({} mode)", mode.as_str());
        let controller = self.clone();
        let handle = tokio::spawn(async move { controller.supervise(request).await });
        Ok(InFlight { handle })
    }

    /// Runs the request in its own task so a panic there still settles the
    /// gate instead of leaving it stuck in flight.
    async fn supervise(self, request: PredictRequest) -> Outcome {
        let worker = self.clone();
        match tokio::spawn(async move { worker.run(request).await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Generation task failed: {}", err);
                self.settle(&Outcome::Transport).await;
                Outcome::Transport
            }
        }
    }

    async fn run(&self, request: PredictRequest) -> Outcome {
        let delay = self.shared.settings.request_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = match self.shared.backend.predict(&request).await {
            Ok(response) => outcome::classify(&response, Utc::now()),
            Err(err) => {
                error!("Error calling image backend: {}", err);
                Outcome::Transport
            }
        };
        self.settle(&outcome).await;
        outcome
    }

    /// Stores the result and decides how the gate reopens.
    async fn settle(&self, outcome: &Outcome) {
        let settings = &self.shared.settings;
        let mut state = self.shared.state.lock().await;

        state.set_result(Some(outcome.to_last_result(settings.throttle_cooldown_secs)));

        match outcome.cooldown_secs(settings) {
            Some(seconds) => {
                if *outcome == Outcome::Throttled {
                    warn!("Throttled by remote, cooling down {}s", seconds);
                } else {
                    info!("Image generated, cooling down {}s", seconds);
                }
                self.arm_cooldown(&mut state, seconds);
            }
            None => {
                info!("Generation failed, gate reopened");
                state.phase = Phase::Idle;
            }
        }
    }

    fn arm_cooldown(&self, state: &mut SessionState, seconds: u64) {
        cooldown::arm(&self.shared, state, seconds);
    }

    /// Cancels a pending cooldown timer. The gate is left as it is.
    pub async fn shutdown(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(handle) = state.cooldown.take() {
            debug!("Aborting cooldown timer");
            handle.abort();
        }
    }
}
