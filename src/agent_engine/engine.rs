use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::event_bus::{EngineEvent, EventBus};
use crate::agent_engine::history::{RunLog, RunRecord};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::settings::RunSettings;
use crate::agent_engine::state::{ActionResult, AgentAction, AgentState, ApprovalDecision};
use crate::config::PromptsConfig;
use crate::errors::{SeeClawError, SeeClawResult};
use crate::executor::dispatcher::{Executor, TerminalPolicy};
use crate::executor::input::InputDevice;
use crate::executor::safety::SafetyGate;
use crate::llm::planner::{PlanOutcome, Planner};
use crate::llm::prompt::{PlanningContext, PromptBuilder};
use crate::llm::tools::catalog;
use crate::llm::types::ToolDef;
use crate::mcp::ExtensionRegistry;
use crate::perception::pipeline::PerceptionPipeline;
use crate::perception::stability::await_stable;
use crate::perception::types::PerceptionSnapshot;
use crate::rag::experience::ExperienceSource;
use crate::skills::manager::SkillsManager;

const COMMAND_CAPACITY: usize = 32;

/// Messages from the handle into the engine task.
#[derive(Debug)]
pub enum ControlCommand {
    Start(RunRequest),
    Approval(ApprovalDecision),
}

#[derive(Debug)]
pub struct RunRequest {
    pub run_id: String,
    pub goal: String,
    pub settings: RunSettings,
    pub cancel: CancellationToken,
}

/// Devices and services the engine drives. Built once per process.
pub struct EngineDeps {
    pub perception: PerceptionPipeline,
    pub input: Arc<dyn InputDevice>,
    pub planner: Planner,
    pub builtin_tools: Vec<ToolDef>,
    pub prompts: PromptsConfig,
    pub extensions: Arc<dyn ExtensionRegistry>,
    pub skills: Arc<SkillsManager>,
    pub experience: Arc<dyn ExperienceSource>,
    /// `None` logs runs under the platform data directory.
    pub run_log_dir: Option<PathBuf>,
}

/// Planner and perception rebuilt from an edited config. The engine swaps
/// them in when the next run starts; a run in progress keeps its own.
pub struct Reconfiguration {
    pub planner: Planner,
    pub perception: PerceptionPipeline,
}

type PendingReconfiguration = Arc<Mutex<Option<Reconfiguration>>>;

/// Cloneable front door to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<ControlCommand>,
    events: EventBus,
    active: Arc<AtomicBool>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    pending: PendingReconfiguration,
}

impl EngineHandle {
    /// Start a run. Fails when the goal is blank or a run is already active.
    pub async fn start_task(&self, goal: impl Into<String>, settings: RunSettings) -> SeeClawResult<String> {
        let goal = goal.into();
        if goal.trim().is_empty() {
            return Err(SeeClawError::Agent("goal must not be empty".into()));
        }
        settings.loop_config.validate()?;
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SeeClawError::Agent("a task is already running".into()));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

        let request = RunRequest {
            run_id: run_id.clone(),
            goal,
            settings,
            cancel,
        };
        if self.cmd_tx.send(ControlCommand::Start(request)).await.is_err() {
            self.cancel.lock().unwrap_or_else(PoisonError::into_inner).take();
            self.active.store(false, Ordering::SeqCst);
            return Err(SeeClawError::Agent("agent engine is not running".into()));
        }
        Ok(run_id)
    }

    /// Request cancellation of the active run. Returns whether one was active.
    pub fn stop_task(&self) -> bool {
        match self.cancel.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(token) => {
                tracing::info!("stop requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Answer a pending approval request. Decisions that arrive when nothing
    /// is pending are discarded by the engine.
    pub async fn submit_approval(&self, decision: ApprovalDecision) -> SeeClawResult<()> {
        if !self.is_running() {
            return Err(SeeClawError::Agent("no task is running".into()));
        }
        self.cmd_tx
            .send(ControlCommand::Approval(decision))
            .await
            .map_err(|_| SeeClawError::Agent("agent engine is not running".into()))
    }

    /// Queue a new planner and perception pipeline for the next run. A later
    /// call replaces an update that has not been picked up yet.
    pub fn reconfigure(&self, update: Reconfiguration) {
        tracing::info!(planner = %update.planner.provider_name(), "engine reconfiguration queued");
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(update);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Per-run working set. Dropped when the run ends.
struct Run {
    id: String,
    goal: String,
    settings: RunSettings,
    cancel: CancellationToken,
    gate: SafetyGate,
    executor: Executor,
    prompt: PromptBuilder,
    tools: Vec<ToolDef>,
    loop_ctl: LoopController,
    log: RunLog,
    history: Vec<ActionResult>,
    experience: Option<String>,
    /// Why the previous planning turn was unusable, shown to the model once.
    note: Option<String>,
    /// The snapshot the pending action was planned against.
    snapshot: Option<PerceptionSnapshot>,
    /// Overlay choice for the next capture, set by `get_viewport`.
    annotate_next: Option<bool>,
}

/// Single-task state machine: Planning → (AwaitingApproval) → Executing →
/// (AwaitingStability) → Planning, until Done, Error or Idle.
pub struct AgentEngine {
    deps: EngineDeps,
    events: EventBus,
    cmd_rx: mpsc::Receiver<ControlCommand>,
    active: Arc<AtomicBool>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    pending: PendingReconfiguration,
}

impl AgentEngine {
    /// Spawn the engine task. It exits once every handle is dropped.
    pub fn spawn(deps: EngineDeps) -> (EngineHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let events = EventBus::default();
        let active = Arc::new(AtomicBool::new(false));
        let cancel = Arc::new(Mutex::new(None));
        let pending = Arc::new(Mutex::new(None));

        let engine = AgentEngine {
            deps,
            events: events.clone(),
            cmd_rx,
            active: active.clone(),
            cancel: cancel.clone(),
            pending: pending.clone(),
        };
        let handle = EngineHandle {
            cmd_tx,
            events,
            active,
            cancel,
            pending,
        };
        (handle, tokio::spawn(engine.serve()))
    }

    async fn serve(mut self) {
        tracing::info!(planner = %self.deps.planner.provider_name(), "agent engine ready");
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                ControlCommand::Start(request) => self.run(request).await,
                ControlCommand::Approval(decision) => {
                    tracing::debug!(?decision, "no approval pending, decision discarded");
                }
            }
        }
        tracing::info!("agent engine stopped");
    }

    async fn run(&mut self, request: RunRequest) {
        let RunRequest {
            run_id,
            goal,
            settings,
            cancel,
        } = request;
        self.adopt_reconfiguration();
        tracing::info!(run_id = %run_id, goal = %goal, mode = ?settings.loop_config.mode, "run started");

        let mut log = RunLog::open(self.deps.run_log_dir.as_deref(), &run_id);
        log.push(RunRecord::new("user", goal.clone(), None));

        let experience = match self.deps.experience.recall(&goal).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "experience recall failed");
                None
            }
        };

        let mut run = Run {
            gate: SafetyGate::new(settings.require_approval_for.iter().cloned()),
            executor: Executor::new(
                self.deps.input.clone(),
                self.deps.extensions.clone(),
                self.deps.skills.clone(),
                TerminalPolicy::new(settings.allow_terminal_commands, settings.allow_file_operations),
            ),
            prompt: PromptBuilder::new(
                &self.deps.prompts,
                self.deps.skills.planner_context().as_deref(),
                settings.history_window,
            ),
            tools: catalog(
                &self.deps.builtin_tools,
                settings.allow_terminal_commands,
                self.deps.skills.has_enabled(),
                self.deps.extensions.tool_defs(),
            ),
            loop_ctl: LoopController::new(settings.loop_config.clone()),
            id: run_id,
            goal,
            settings,
            cancel,
            log,
            history: Vec::new(),
            experience,
            note: None,
            snapshot: None,
            annotate_next: None,
        };

        let mut state = AgentState::Planning { goal: run.goal.clone() };
        let final_state = loop {
            self.publish(&run.id, &state);
            let next = self.step(&mut run, state).await;
            let next = if run.cancel.is_cancelled() && !next.is_terminal() {
                AgentState::Idle
            } else {
                next
            };
            if next.is_terminal() {
                break next;
            }
            state = next;
        };

        self.finish(run, &final_state).await;
    }

    async fn step(&mut self, run: &mut Run, state: AgentState) -> AgentState {
        match state {
            AgentState::Planning { goal } => self.plan(run, goal).await,
            AgentState::AwaitingApproval { action } => self.await_approval(run, action).await,
            AgentState::Executing { action } => self.execute(run, action).await,
            AgentState::AwaitingStability { action } => {
                self.activity(&run.id, "waiting for the screen to settle");
                let capturer = self.deps.perception.capturer().clone();
                let settled = await_stable(
                    || {
                        let capturer = capturer.clone();
                        async move { capturer.capture_frame().await }
                    },
                    &run.settings.stability,
                    &run.cancel,
                )
                .await;
                match settled {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(action = %action.describe(), "screen did not settle, continuing"),
                    Err(e) => tracing::warn!(error = %e, "stability sampling failed, continuing"),
                }
                AgentState::Planning { goal: run.goal.clone() }
            }
            terminal => terminal,
        }
    }

    async fn plan(&mut self, run: &mut Run, goal: String) -> AgentState {
        if let Some(reason) = run.loop_ctl.check() {
            return AgentState::Error { message: reason.to_string() };
        }
        let cycle = run.loop_ctl.begin_cycle();
        self.activity(&run.id, format!("cycle {cycle}: capturing screen"));

        let captured = tokio::select! {
            biased;
            _ = run.cancel.cancelled() => return AgentState::Idle,
            s = self.deps.perception.capture_with(run.annotate_next.take()) => s,
        };
        let snapshot = match captured {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "screen capture failed");
                return AgentState::Error {
                    message: format!("screen capture failed: {e}"),
                };
            }
        };
        self.events.emit(EngineEvent::PerceptionCaptured {
            run_id: run.id.clone(),
            image_base64: snapshot
                .image()
                .map(|png| base64::engine::general_purpose::STANDARD.encode(png)),
            source: snapshot.source(),
            grid_n: snapshot.grid_n(),
            element_count: snapshot.elements().len(),
        });

        let messages = run.prompt.build(&PlanningContext {
            goal: &goal,
            snapshot: &snapshot,
            history: &run.history,
            experience: run.experience.as_deref(),
            note: run.note.as_deref(),
        });
        run.snapshot = Some(snapshot);

        self.activity(&run.id, "planning");
        let events = self.events.clone();
        let run_id = run.id.clone();
        let outcome = self
            .deps
            .planner
            .plan(messages, &run.tools, &run.cancel, move |chunk| {
                events.emit(EngineEvent::StreamChunk {
                    run_id: run_id.clone(),
                    chunk,
                })
            })
            .await;

        match outcome {
            Err(SeeClawError::Cancelled) => AgentState::Idle,
            Err(e) => AgentState::Error { message: e.to_string() },
            Ok(PlanOutcome::Finish { summary }) => {
                tracing::info!(cycle, summary = %summary, "goal reported complete");
                AgentState::Done { summary }
            }
            Ok(PlanOutcome::Failure { reason }) => {
                tracing::warn!(cycle, reason = %reason, "goal reported unreachable");
                AgentState::Error { message: reason }
            }
            Ok(PlanOutcome::Unusable { detail }) => {
                tracing::warn!(cycle, detail = %detail, "planning cycle produced no action");
                run.loop_ctl.record_result(false);
                run.log.push(RunRecord::new("assistant", detail.clone(), None));
                run.note = Some(detail);
                match run.loop_ctl.check() {
                    Some(reason) => AgentState::Error { message: reason.to_string() },
                    None => AgentState::Planning { goal },
                }
            }
            Ok(PlanOutcome::Next { action, rationale }) => {
                run.note = None;
                tracing::info!(cycle, action = %action.describe(), "planned");
                run.log.push(RunRecord::new("assistant", rationale, Some(action.clone())));
                if run.gate.requires_approval(&action) {
                    AgentState::AwaitingApproval { action }
                } else {
                    AgentState::Executing { action }
                }
            }
        }
    }

    async fn await_approval(&mut self, run: &mut Run, action: AgentAction) -> AgentState {
        // Anything queued before the request exists answers nothing.
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            discard_stale(cmd);
        }

        let request = run.gate.intercept(&action);
        tracing::info!(request_id = %request.id, reason = %request.reason, "approval required");
        self.events.emit(EngineEvent::ApprovalRequired {
            run_id: run.id.clone(),
            request,
        });

        loop {
            let cmd = tokio::select! {
                biased;
                _ = run.cancel.cancelled() => return AgentState::Idle,
                cmd = self.cmd_rx.recv() => cmd,
            };
            match cmd {
                Some(ControlCommand::Approval(decision)) if decision.approved => {
                    tracing::info!(action = %action.describe(), "approved");
                    return AgentState::Executing { action };
                }
                Some(ControlCommand::Approval(_)) => {
                    tracing::info!(action = %action.describe(), "rejected, stopping run");
                    run.log.push(RunRecord::new("user", "rejected", Some(action)));
                    return AgentState::Idle;
                }
                Some(other) => discard_stale(other),
                None => return AgentState::Idle,
            }
        }
    }

    async fn execute(&mut self, run: &mut Run, action: AgentAction) -> AgentState {
        self.activity(&run.id, format!("executing: {}", action.describe()));
        let result = match run.snapshot.as_ref() {
            Some(snapshot) => run.executor.execute(&action, snapshot).await,
            None => ActionResult::failed(action.clone(), "no perception snapshot for this action"),
        };

        run.loop_ctl.record_result(result.success);
        let content = match (&result.error, &result.output) {
            (Some(err), _) => format!("failed: {err}"),
            (None, Some(out)) => out.clone(),
            (None, None) => "ok".to_string(),
        };
        run.log.push(RunRecord::new("tool", content, Some(action.clone())));
        if let (AgentAction::GetViewport { annotate }, true) = (&action, result.success) {
            run.annotate_next = Some(*annotate);
        }
        run.history.push(result);

        if let Some(reason) = run.loop_ctl.check() {
            return AgentState::Error { message: reason.to_string() };
        }
        if action.changes_screen() {
            AgentState::AwaitingStability { action }
        } else {
            AgentState::Planning { goal: run.goal.clone() }
        }
    }

    async fn finish(&mut self, mut run: Run, final_state: &AgentState) {
        let summary = match final_state {
            AgentState::Done { summary } => format!("done: {summary}"),
            AgentState::Error { message } => format!("error: {message}"),
            _ => "stopped".to_string(),
        };
        run.log.push(RunRecord::new("system", summary, None));

        if let AgentState::Done { summary } = final_state {
            if let Err(e) = self.deps.experience.record(&run.goal, &run.history, summary).await {
                tracing::warn!(error = %e, "failed to record experience");
            }
        }

        tracing::info!(
            run_id = %run.id,
            state = final_state.tag(),
            cycles = run.loop_ctl.cycles(),
            actions = run.history.len(),
            "run finished"
        );
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.active.store(false, Ordering::SeqCst);
        self.publish(&run.id, final_state);
    }

    fn adopt_reconfiguration(&mut self) {
        let update = self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Reconfiguration { planner, perception }) = update {
            tracing::info!(planner = %planner.provider_name(), "adopting reconfigured planner and perception");
            self.deps.planner = planner;
            self.deps.perception = perception;
        }
    }

    fn publish(&self, run_id: &str, state: &AgentState) {
        tracing::debug!(run_id, state = state.tag(), "state changed");
        self.events.emit(EngineEvent::StateChanged {
            run_id: run_id.to_string(),
            state: state.clone(),
        });
    }

    fn activity(&self, run_id: &str, label: impl Into<String>) {
        self.events.emit(EngineEvent::Activity {
            run_id: run_id.to_string(),
            label: label.into(),
        });
    }
}

fn discard_stale(cmd: ControlCommand) {
    match cmd {
        ControlCommand::Approval(decision) => {
            tracing::debug!(?decision, "stale approval discarded");
        }
        ControlCommand::Start(request) => {
            tracing::warn!(run_id = %request.run_id, "start received while a run is active, ignored");
        }
    }
}
