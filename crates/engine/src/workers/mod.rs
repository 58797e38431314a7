// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background workers: the task-execution fabric.
//!
//! Each worker consumes one named queue. A task checks the session
//! state on entry, passes the budget gate when it will call the model,
//! does its work, and re-enters the orchestrator through intake.
//! Every failure is caught at the outermost frame and converted into a
//! structured result; the orchestrator decides retry vs give up, not
//! the worker.

mod prompts;

use std::sync::Arc;
use std::time::Duration;

use fl_core::{
    Clock, FailCause, FailCode, LogCategory, SessionEvent, SessionLogger, SessionRecord,
    TaskName, WorkerEnvelope, WorkerOutput, WorkerQueue,
};
use fl_objstore::{ObjectGateway, ObjectKey};

use crate::ai::{parse, AiClient, AiError, AiRequest, AiResponse};
use crate::error::EngineError;
use crate::evaluator;
use crate::gate::{BudgetGate, GateDecision, GateError};
use crate::intake::Intake;
use crate::recorder;
use crate::task_args::{AnalyzeArgs, EvaluateArgs, IngestLogArgs, PageVisualArgs, RecoverArgs,
    RegenerateArgs, SaveArgs, StepVisualArgs, UiVisualArgs};

const IDLE_POLL: Duration = Duration::from_millis(500);

/// One worker bound to one queue.
pub struct Worker<C: Clock> {
    queue: WorkerQueue,
    intake: Intake<C>,
    gate: BudgetGate<C>,
    ai: Arc<dyn AiClient>,
    objstore: Option<ObjectGateway>,
}

impl<C: Clock> Worker<C> {
    pub fn new(
        queue: WorkerQueue,
        intake: Intake<C>,
        gate: BudgetGate<C>,
        ai: Arc<dyn AiClient>,
    ) -> Self {
        Self { queue, intake, gate, ai, objstore: None }
    }

    pub fn with_objstore(mut self, objstore: ObjectGateway) -> Self {
        self.objstore = Some(objstore);
        self
    }

    /// Consume the queue until the process is stopped.
    pub async fn run(&self) {
        tracing::info!(queue = %self.queue, "worker started");
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(IDLE_POLL).await,
                Err(err) => {
                    tracing::error!(queue = %self.queue, error = %err, "worker tick failed");
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }
    }

    /// Pop and process one envelope. Returns whether work was done.
    pub async fn tick(&self) -> Result<bool, EngineError> {
        let Some(envelope) = self.intake.fast().pop_worker(self.queue).await? else {
            return Ok(false);
        };
        self.process(envelope).await;
        Ok(true)
    }

    async fn process(&self, envelope: WorkerEnvelope) {
        // Log fan-out is not a session transition; handle it apart.
        if envelope.task == TaskName::IngestLogBlob {
            if let Err(err) = self.ingest_log_blob(&envelope).await {
                tracing::error!(
                    session_id = %envelope.session_id,
                    error = %err,
                    "log blob ingestion failed"
                );
            }
            return;
        }

        // Check the session on entry: a cancelled or reset session
        // means the work would be discarded anyway.
        let record = match self.intake.fast().load_session(&envelope.session_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(
                    session_id = %envelope.session_id,
                    task = %envelope.task,
                    "task for unknown session dropped"
                );
                return;
            }
            Err(err) => {
                tracing::error!(
                    session_id = %envelope.session_id,
                    error = %err,
                    "session load failed, task dropped"
                );
                return;
            }
        };
        if record.is_terminal() || envelope.session_version < record.version {
            tracing::info!(
                session_id = %envelope.session_id,
                task = %envelope.task,
                "task skipped: session moved on"
            );
            return;
        }

        let logger = logger_for(&record);
        let output = match self.execute(&envelope, &record, &logger).await {
            Ok(output) => output,
            Err(err) => {
                let cause = classify(&err);
                logger.worker_failed(&envelope.task.to_string(), &err.to_string());
                WorkerOutput::Failed { cause }
            }
        };

        let event = SessionEvent::WorkerDone { task: envelope.task, output };
        if let Err(err) = self
            .intake
            .submit(&envelope.session_id, event, Some(envelope.session_version))
            .await
        {
            logger.error(
                LogCategory::WorkerTask,
                &format!("result intake failed for {}: {err}", envelope.task),
            );
        }
    }

    async fn execute(
        &self,
        envelope: &WorkerEnvelope,
        record: &SessionRecord,
        logger: &SessionLogger,
    ) -> Result<WorkerOutput, EngineError> {
        match envelope.task {
            TaskName::AnalyzeFormPage => {
                let args: AnalyzeArgs = parse_args(envelope)?;
                let prompt = prompts::analyze_form_page(&args);
                let response = self.call_model(record, logger, prompt).await?;
                Ok(match parse::parse_steps(&response.text) {
                    Ok(stages) => WorkerOutput::Steps { stages },
                    Err(detail) => parse_failure(detail),
                })
            }

            TaskName::RegenerateSteps => {
                let args: RegenerateArgs = parse_args(envelope)?;
                let prompt = prompts::regenerate_steps(&args);
                let response = self.call_model(record, logger, prompt).await?;
                Ok(match parse::parse_steps(&response.text) {
                    Ok(stages) => WorkerOutput::Steps { stages },
                    Err(detail) => parse_failure(detail),
                })
            }

            TaskName::AnalyzeFailureAndRecover => {
                let args: RecoverArgs = parse_args(envelope)?;
                let prompt = prompts::analyze_failure(&args);
                let response = self.call_model(record, logger, prompt).await?;
                Ok(match parse::parse_recovery(&response.text) {
                    Ok(decision) => WorkerOutput::Recovery { decision },
                    Err(detail) => parse_failure(detail),
                })
            }

            TaskName::VerifyUiVisual => {
                let args: UiVisualArgs = parse_args(envelope)?;
                let prompt = prompts::verify_ui_visual(&args);
                let response = self.call_model(record, logger, prompt).await?;
                Ok(match parse::parse_ui_visual(&response.text) {
                    Ok(payload) => WorkerOutput::UiVisual { new_issues: payload.new_issues },
                    Err(detail) => parse_failure(detail),
                })
            }

            TaskName::VerifyPageVisual => {
                let args: PageVisualArgs = parse_args(envelope)?;
                let prompt = prompts::verify_page_visual(&args);
                let response = self.call_model(record, logger, prompt).await?;
                Ok(match parse::parse_page_verdict(&response.text) {
                    Ok(payload) => WorkerOutput::PageVerdict {
                        ready: payload.ready,
                        failures: payload.failures,
                    },
                    Err(detail) => parse_failure(detail),
                })
            }

            TaskName::VerifyDynamicStepVisual => {
                let args: StepVisualArgs = parse_args(envelope)?;
                let prompt = prompts::verify_dynamic_step(&args);
                let response = self.call_model(record, logger, prompt).await?;
                Ok(match parse::parse_step_visual(&response.text) {
                    Ok(payload) => WorkerOutput::StepVisual {
                        passed: payload.passed,
                        blocking_issue: payload.blocking_issue,
                        detail: payload.detail,
                    },
                    Err(detail) => parse_failure(detail),
                })
            }

            TaskName::EvaluatePaths => {
                let mut args: EvaluateArgs = parse_args(envelope)?;
                let decision = evaluator::evaluate_paths(&mut args.tracker, &args.config);
                Ok(WorkerOutput::Paths { decision, tracker: Some(args.tracker) })
            }

            TaskName::SaveMappingResult => {
                let args: SaveArgs = parse_args(envelope)?;
                let path_number = args.path_number;
                let result_id = recorder::save_result(
                    self.intake.repos(),
                    &envelope.session_id,
                    args,
                    self.intake.clock().epoch_ms(),
                )
                .await?;
                Ok(WorkerOutput::Saved { result_id, path_number })
            }

            // Handled before the session load in `process`.
            TaskName::IngestLogBlob => Err(EngineError::BadTaskArgs {
                task: envelope.task.to_string(),
                detail: "log ingestion is not a session transition".into(),
            }),
        }
    }

    /// Gate, call, settle. Releases the reservation on failure.
    async fn call_model(
        &self,
        record: &SessionRecord,
        logger: &SessionLogger,
        prompt: String,
    ) -> Result<AiResponse, EngineError> {
        let decision: GateDecision = self.gate.check(record.tenant_id).await?;
        let request = AiRequest::new(decision.api_key.clone(), prompt.clone());

        match self.ai.complete(request).await {
            Ok(response) => {
                self.gate
                    .record_usage(
                        record.tenant_id,
                        decision.reserved_micros,
                        response.input_tokens,
                        response.output_tokens,
                    )
                    .await?;
                logger.ai_exchange(&prompt, &response.text);
                Ok(response)
            }
            Err(err) => {
                if let Err(release_err) = self
                    .gate
                    .release(record.tenant_id, decision.reserved_micros)
                    .await
                {
                    tracing::error!(
                        tenant_id = record.tenant_id.0,
                        error = %release_err,
                        "failed to release budget reservation"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Pull an agent-uploaded log bundle apart into relational rows and
    /// delete the blob.
    async fn ingest_log_blob(&self, envelope: &WorkerEnvelope) -> Result<(), EngineError> {
        let args: IngestLogArgs = parse_args(envelope)?;
        let Some(objstore) = &self.objstore else {
            return Err(EngineError::BadTaskArgs {
                task: envelope.task.to_string(),
                detail: "no object store configured for this worker".into(),
            });
        };
        let key = ObjectKey::parse(&args.object_key)?;
        let bytes = objstore.fetch(&key).await?;
        let rows: Vec<fl_store::ActivityLogRow> = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::BadTaskArgs {
                task: envelope.task.to_string(),
                detail: format!("malformed log bundle: {e}"),
            })?;
        let inserted = self.intake.repos().logs.insert_batch(&rows).await?;
        objstore.delete(&key).await?;
        tracing::info!(
            session_id = %args.session_id,
            inserted,
            "log bundle ingested"
        );
        Ok(())
    }
}

fn logger_for(record: &SessionRecord) -> SessionLogger {
    SessionLogger::new(
        record.id,
        record.tenant_id,
        record.user_id,
        record.activity,
        record.config.debug_mode,
    )
}

fn parse_args<T: serde::de::DeserializeOwned>(
    envelope: &WorkerEnvelope,
) -> Result<T, EngineError> {
    serde_json::from_value(envelope.args.clone()).map_err(|e| EngineError::BadTaskArgs {
        task: envelope.task.to_string(),
        detail: e.to_string(),
    })
}

fn parse_failure(detail: String) -> WorkerOutput {
    WorkerOutput::Failed {
        cause: FailCause::new(FailCode::AiParseError, detail),
    }
}

/// Map an engine failure to the structured cause the orchestrator
/// rules on.
fn classify(err: &EngineError) -> FailCause {
    match err {
        EngineError::Gate(GateError::AccessDenied { reason, .. }) => {
            FailCause::new(FailCode::AccessDenied, reason.clone())
        }
        EngineError::Gate(GateError::BudgetExceeded { spent_micros, .. }) => {
            FailCause::new(
                FailCode::BudgetExceeded,
                format!("daily AI budget exhausted ({spent_micros} µ$ spent)"),
            )
        }
        EngineError::Ai(AiError::Overloaded { attempts }) => FailCause::new(
            FailCode::Internal,
            format!("model overloaded after {attempts} attempts"),
        ),
        other => FailCause::new(FailCode::Internal, other.to_string()),
    }
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
