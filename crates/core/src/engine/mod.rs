//! Pipeline orchestrator.
//!
//! The [`Orchestrator`] runs one user turn at a time: it loads the session
//! checkpoint, seeds a fresh [`PipelineState`], routes the request, runs the
//! stages in order, and saves the state back only when the turn succeeded.
//!
//! ```text
//! awaiting approval ──────────────────────────────┐
//! route ─ generate → [test] → evaluate            │
//!       └ plan → ask approval ⟂                   │
//!                 handle approval ←───────────────┘
//!                   → execute subtasks → integrate → test → evaluate
//! ```
//!
//! Every stage entry checks the global iteration ceiling; once it is reached
//! the turn skips straight to finalization.

use crate::config::models::{AppConfig, VerifierKind};
use crate::error::TurnResult;
use crate::extract::ArtifactExtractor;
use crate::model::{ChatModel, ModelError, OllamaModel, ResilientModel, RetryPolicy};
use crate::planner::{
    ask_approval, execute_plan, handle_approval, make_plan, revise_plan, ApprovalPolicy,
    ApprovalReply, DefaultPlanPolicy, PlanPolicy, PlanProgress, PlannerContext,
    TokenApprovalPolicy,
};
use crate::repair::runner::LoopContext;
use crate::router::{route_request, LengthRoutePolicy, RoutePolicy};
use crate::stages::evaluator::{finalize_at_ceiling, run_evaluator};
use crate::stages::generator::run_generator;
use crate::stages::integrator::run_integrator;
use crate::stages::tester::run_tester;
use crate::stages::StageContext;
use crate::state::checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use crate::state::turn::{complete_stage, emit, enter_stage, reset_loop_counters, seed_turn};
use crate::tools::{
    CommandVerifier, ExecutePort, HttpVerifier, ToolExecutor, VerificationPort, Verifier,
    VerifierError,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};
use vk_protocol::ipc::Event;
use vk_protocol::state_models::{PipelineState, Route, Stage, StateUpdate};
use vk_protocol::turn_models::{TurnInput, TurnOutput};

/// Errors raised while assembling an [`Orchestrator`].
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    #[error("Failed to create model adapter: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to create verifier: {0}")]
    Verifier(#[from] VerifierError),
}

/// Builder for [`Orchestrator`].
///
/// The model and the verifier are required. Policies default to the
/// built-in ones and checkpoints default to an in-memory store.
pub struct OrchestratorBuilder {
    config: AppConfig,
    model: Option<Arc<dyn ChatModel>>,
    verifier: Option<Arc<dyn Verifier>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    route_policy: Option<Arc<dyn RoutePolicy>>,
    plan_policy: Option<Arc<dyn PlanPolicy>>,
    approval_policy: Option<Arc<dyn ApprovalPolicy>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            model: None,
            verifier: None,
            checkpoints: None,
            route_policy: None,
            plan_policy: None,
            approval_policy: None,
        }
    }

    pub fn model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn route_policy(mut self, policy: Arc<dyn RoutePolicy>) -> Self {
        self.route_policy = Some(policy);
        self
    }

    pub fn plan_policy(mut self, policy: Arc<dyn PlanPolicy>) -> Self {
        self.plan_policy = Some(policy);
        self
    }

    pub fn approval_policy(mut self, policy: Arc<dyn ApprovalPolicy>) -> Self {
        self.approval_policy = Some(policy);
        self
    }

    /// # Errors
    ///
    /// Returns `BuildError::MissingComponent` when no model or verifier was given.
    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let model = self.model.ok_or(BuildError::MissingComponent("model"))?;
        let verifier = self
            .verifier
            .ok_or(BuildError::MissingComponent("verifier"))?;

        let port = VerificationPort::new(verifier, ExecutePort::new(self.config.verifier.timeout()));
        let route_policy = self
            .route_policy
            .unwrap_or_else(|| Arc::new(LengthRoutePolicy::from(&self.config.router)));

        Ok(Orchestrator {
            model: ResilientModel::new(model, RetryPolicy::from(&self.config.retry)),
            tools: ToolExecutor::new(port),
            extractor: ArtifactExtractor::from(&self.config.artifact),
            checkpoints: self
                .checkpoints
                .unwrap_or_else(|| Arc::new(InMemoryCheckpointStore::new())),
            route_policy,
            plan_policy: self
                .plan_policy
                .unwrap_or_else(|| Arc::new(DefaultPlanPolicy::default())),
            approval_policy: self
                .approval_policy
                .unwrap_or_else(|| Arc::new(TokenApprovalPolicy::default())),
            config: self.config,
        })
    }
}

/// Runs user turns through the pipeline.
pub struct Orchestrator {
    config: AppConfig,
    model: ResilientModel,
    tools: ToolExecutor,
    extractor: ArtifactExtractor,
    checkpoints: Arc<dyn CheckpointStore>,
    route_policy: Arc<dyn RoutePolicy>,
    plan_policy: Arc<dyn PlanPolicy>,
    approval_policy: Arc<dyn ApprovalPolicy>,
}

impl Orchestrator {
    pub fn builder(config: AppConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Assemble an orchestrator from configuration alone.
    ///
    /// Uses the Ollama-compatible model adapter, the configured verifier
    /// transport, and a file checkpoint store when `checkpoint.dir` is set.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` if an adapter cannot be created or the command
    /// verifier has no program configured.
    pub fn from_config(config: AppConfig) -> Result<Self, BuildError> {
        let model: Arc<dyn ChatModel> = Arc::new(OllamaModel::new(&config.model)?);

        let verifier: Arc<dyn Verifier> = match config.verifier.kind {
            VerifierKind::Http => Arc::new(HttpVerifier::new(
                &config.verifier.endpoint,
                config.verifier.timeout(),
            )?),
            VerifierKind::Command => {
                let program = config
                    .verifier
                    .program
                    .clone()
                    .ok_or(BuildError::MissingComponent("verifier.program"))?;
                Arc::new(CommandVerifier::new(program, config.verifier.args.clone()))
            }
        };

        let checkpoints: Arc<dyn CheckpointStore> = match &config.checkpoint.dir {
            Some(dir) => Arc::new(FileCheckpointStore::new(dir.clone())),
            None => Arc::new(InMemoryCheckpointStore::new()),
        };

        OrchestratorBuilder::new(config)
            .model(model)
            .verifier(verifier)
            .checkpoints(checkpoints)
            .build()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub fn verifier_name(&self) -> &str {
        self.tools.port().verifier_name()
    }

    /// Whether the verification tools are reachable.
    pub async fn check_verifier(&self) -> bool {
        self.tools.port().check_availability().await
    }

    /// Drop a session's checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `TurnError::Checkpoint` if the store fails.
    pub async fn forget_session(&self, session_id: &str) -> TurnResult<()> {
        self.checkpoints.delete(session_id).await?;
        Ok(())
    }

    /// Run one user turn.
    ///
    /// Progress is reported on `events_tx`. The updated state is checkpointed
    /// only when the turn succeeds, so a fatal error leaves the session as it
    /// was before the turn.
    ///
    /// # Arguments
    ///
    /// * `input` - Session id and user message
    /// * `events_tx` - Channel for trace events
    ///
    /// # Returns
    ///
    /// The final artifact and summaries, or the approval prompt when the
    /// planner suspended the turn.
    ///
    /// # Errors
    ///
    /// Returns `TurnError` for fatal model, verifier or checkpoint failures.
    pub async fn run_turn(
        &self,
        input: TurnInput,
        events_tx: &Sender<Event>,
    ) -> TurnResult<TurnOutput> {
        info!(session_id = %input.session_id, "Turn started");
        emit(
            events_tx,
            Event::TurnStarted {
                session_id: input.session_id.clone(),
            },
        )
        .await;

        match self.run_turn_inner(&input, events_tx).await {
            Ok(state) => {
                let output = TurnOutput::from_state(&state);
                info!(
                    session_id = %input.session_id,
                    suspended = output.suspended,
                    compiled = output.compiled(),
                    global_iteration = state.global_iteration_count,
                    "Turn completed"
                );
                emit(
                    events_tx,
                    Event::TurnCompleted {
                        suspended: output.suspended,
                        compiled: output.compiled(),
                    },
                )
                .await;
                Ok(output)
            }
            Err(e) => {
                warn!(session_id = %input.session_id, error = %e, "Turn failed");
                emit(
                    events_tx,
                    Event::TurnFailed {
                        error: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run_turn_inner(
        &self,
        input: &TurnInput,
        events_tx: &Sender<Event>,
    ) -> TurnResult<PipelineState> {
        let previous = self
            .checkpoints
            .load(&input.session_id)
            .await?
            .map(|checkpoint| checkpoint.state);
        let mut state = seed_turn(previous, &input.user_message, &self.config.budget);

        let loop_ctx = LoopContext {
            model: &self.model,
            tools: &self.tools,
            extractor: &self.extractor,
            events: events_tx,
        };
        let ctx = StageContext {
            loop_ctx,
            budget: &self.config.budget,
            language: &self.config.artifact.language,
            stream_integration: self.config.model.stream_integration,
        };
        let planner = PlannerContext {
            model: &self.model,
            plan_policy: self.plan_policy.as_ref(),
            approval_policy: self.approval_policy.as_ref(),
            events: events_tx,
        };

        if state.awaiting_approval {
            info!("Plan awaiting approval, skipping classification");
            self.plan_route(&mut state, ctx, planner).await?;
        } else {
            let message = state.last_user_text().unwrap_or_default();
            let decision =
                route_request(&self.model, self.route_policy.as_ref(), &message).await?;
            emit(
                events_tx,
                Event::Routed {
                    route: decision.route,
                    needs_testing: decision.needs_testing,
                    fallback: decision.fallback,
                },
            )
            .await;
            state.apply(StateUpdate {
                task: Some(message),
                route: Some(decision.route),
                needs_testing: Some(decision.needs_testing),
                ..StateUpdate::default()
            });

            match decision.route {
                Route::Generate => self.generate_route(&mut state, ctx).await?,
                Route::Plan => self.plan_route(&mut state, ctx, planner).await?,
            }
        }

        self.checkpoints.save(&input.session_id, &state).await?;
        Ok(state)
    }

    async fn generate_route(&self, state: &mut PipelineState, ctx: StageContext<'_>) -> TurnResult<()> {
        let events = ctx.loop_ctx.events;
        if !self.begin_stage(state, Stage::Generate, events).await {
            return Ok(());
        }
        let update = run_generator(ctx, state).await?;
        complete_stage(state, Stage::Generate, update, events).await;

        if state.needs_testing && !state.current_artifact().trim().is_empty() {
            if !self.begin_stage(state, Stage::Test, events).await {
                return Ok(());
            }
            let update = run_tester(ctx, state).await?;
            complete_stage(state, Stage::Test, update, events).await;
        }

        self.evaluate(state, ctx).await
    }

    async fn plan_route(
        &self,
        state: &mut PipelineState,
        ctx: StageContext<'_>,
        planner: PlannerContext<'_>,
    ) -> TurnResult<()> {
        let events = ctx.loop_ctx.events;
        if !self.begin_stage(state, Stage::Plan, events).await {
            return Ok(());
        }

        if !state.awaiting_approval {
            let update = make_plan(planner, state).await?;
            state.apply(update);
            let update = ask_approval(planner, &state.plan).await;
            complete_stage(state, Stage::Plan, update, events).await;
            return Ok(());
        }

        let (reply, update) = handle_approval(planner, state);
        state.apply(update);
        match reply {
            ApprovalReply::Unrecognized => {
                emit(
                    events,
                    Event::AwaitingApproval {
                        plan: state.plan.clone(),
                    },
                )
                .await;
                complete_stage(state, Stage::Plan, StateUpdate::default(), events).await;
                return Ok(());
            }
            ApprovalReply::Reject => {
                let feedback = state.last_user_text().unwrap_or_default();
                let update = revise_plan(planner, state, &feedback).await?;
                state.apply(update);
                let update = ask_approval(planner, &state.plan).await;
                complete_stage(state, Stage::Plan, update, events).await;
                return Ok(());
            }
            ApprovalReply::Approve => {
                complete_stage(state, Stage::Plan, StateUpdate::default(), events).await;
            }
        }

        if execute_plan(ctx, state).await? == PlanProgress::CeilingReached {
            self.finish_at_ceiling(state, events).await;
            return Ok(());
        }

        if !self.begin_stage(state, Stage::Integrate, events).await {
            return Ok(());
        }
        let update = run_integrator(ctx, state).await?;
        complete_stage(state, Stage::Integrate, update, events).await;

        if !self.begin_stage(state, Stage::Test, events).await {
            return Ok(());
        }
        let update = run_tester(ctx, state).await?;
        complete_stage(state, Stage::Test, update, events).await;

        self.evaluate(state, ctx).await
    }

    async fn evaluate(&self, state: &mut PipelineState, ctx: StageContext<'_>) -> TurnResult<()> {
        let events = ctx.loop_ctx.events;
        if !self.begin_stage(state, Stage::Evaluate, events).await {
            return Ok(());
        }
        let update = run_evaluator(ctx, state).await?;
        complete_stage(state, Stage::Evaluate, update, events).await;
        Ok(())
    }

    /// Enter a stage and reset the per-loop counters.
    ///
    /// At the global ceiling the turn is finalized instead and `false` is
    /// returned.
    async fn begin_stage(
        &self,
        state: &mut PipelineState,
        stage: Stage,
        events: &Sender<Event>,
    ) -> bool {
        if !enter_stage(state, stage, events).await {
            self.finish_at_ceiling(state, events).await;
            return false;
        }
        state.apply(reset_loop_counters());
        true
    }

    async fn finish_at_ceiling(&self, state: &mut PipelineState, events: &Sender<Event>) {
        let update = finalize_at_ceiling(state);
        complete_stage(state, Stage::Evaluate, update, events).await;
    }
}
