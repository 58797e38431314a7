// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Intake: the single write path into a session.
//!
//! Every caller (agent result handlers, background workers, the
//! sweeper, cancellation) funnels through `submit`. Intake loads the
//! record, rejects stale inputs by version, runs the pure transition,
//! writes back with a compare-and-swap, and only then executes the
//! effects. Concurrent intakes serialize on the CAS.

use std::sync::Arc;

use fl_core::{
    AgentDispatch, AgentQueueMessage, AgentTaskParams, AgentTaskRecord, Clock, Config, Effect,
    NewSession, SessionEvent, SessionId, SessionRecord,
};
use fl_store::{FastStore, Repos, StoreError};
use fl_vault::{SecretKind, SecretStore};

use crate::error::EngineError;
use crate::orchestrator;

const MAX_CAS_RETRIES: u32 = 3;

/// The orchestrator's stateful shell.
#[derive(Clone)]
pub struct Intake<C: Clock> {
    fast: Arc<dyn FastStore>,
    repos: Repos,
    vault: SecretStore,
    clock: C,
    config: Arc<Config>,
}

impl<C: Clock> Intake<C> {
    pub fn new(
        fast: Arc<dyn FastStore>,
        repos: Repos,
        vault: SecretStore,
        clock: C,
        config: Arc<Config>,
    ) -> Self {
        Self { fast, repos, vault, clock, config }
    }

    pub fn repos(&self) -> &Repos {
        &self.repos
    }

    pub fn fast(&self) -> &Arc<dyn FastStore> {
        &self.fast
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Create a session, persist its durable row, and dispatch login.
    pub async fn start_session(&self, params: NewSession) -> Result<SessionId, EngineError> {
        let mut record = SessionRecord::new(params, &self.clock);
        self.repos.sessions.insert(&record).await?;

        let effects = orchestrator::kickoff(&mut record, self.clock.epoch_ms());
        self.fast
            .save_session(&record, 0, self.config.session_ttl_secs)
            .await?;
        let session_id = record.id;
        self.execute_effects(&record, effects).await?;
        tracing::info!(session_id = %session_id, "session started");
        Ok(session_id)
    }

    /// Feed one input into a session's state machine.
    ///
    /// `version_snapshot` is the version recorded when the work was
    /// dispatched; an older snapshot than the stored record means the
    /// session was reset or cancelled and the result is discarded.
    pub async fn submit(
        &self,
        session_id: &SessionId,
        event: SessionEvent,
        version_snapshot: Option<u64>,
    ) -> Result<(), EngineError> {
        for attempt in 0..=MAX_CAS_RETRIES {
            let Some(mut record) = self.fast.load_session(session_id).await? else {
                tracing::warn!(
                    session_id = %session_id,
                    event = event.name(),
                    "input for unknown or expired session dropped"
                );
                return Ok(());
            };

            if let Some(snapshot) = version_snapshot {
                if snapshot < record.version {
                    tracing::warn!(
                        session_id = %session_id,
                        snapshot,
                        current = record.version,
                        event = event.name(),
                        "stale result discarded"
                    );
                    return Ok(());
                }
            }

            let loaded_version = record.version;
            let effects =
                orchestrator::advance(&mut record, event.clone(), self.clock.epoch_ms());
            if record.version == loaded_version {
                // Discarded input; nothing to persist.
                return Ok(());
            }

            match self
                .fast
                .save_session(&record, loaded_version, self.config.session_ttl_secs)
                .await
            {
                Ok(()) => {
                    self.execute_effects(&record, effects).await?;
                    return Ok(());
                }
                Err(StoreError::VersionConflict(_)) if attempt < MAX_CAS_RETRIES => {
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StoreError::VersionConflict(session_id.to_string()).into())
    }

    /// User-issued cancellation.
    pub async fn cancel(&self, session_id: &SessionId) -> Result<(), EngineError> {
        self.submit(session_id, SessionEvent::Cancel, None).await
    }

    async fn execute_effects(
        &self,
        record: &SessionRecord,
        effects: Vec<Effect>,
    ) -> Result<(), EngineError> {
        for effect in effects {
            let info: String = effect
                .fields()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            tracing::info!("executing effect={} {}", effect.name(), info);

            match effect {
                Effect::DispatchAgent { user_id, dispatch, delay_ms } => {
                    let params = self.materialize(record, dispatch).await?;
                    let now = self.clock.epoch_ms();
                    let task = AgentTaskRecord::new(
                        record.tenant_id,
                        user_id,
                        params,
                        Some(record.id),
                        now,
                    );
                    self.repos.tasks.insert(&task).await?;

                    let msg = AgentQueueMessage {
                        task_id: task.id,
                        task_type: task.params.kind(),
                        tenant_id: task.tenant_id,
                        user_id,
                    };
                    match delay_ms {
                        Some(delay) => {
                            self.fast
                                .push_agent_task_delayed(user_id, &msg, now + delay)
                                .await?
                        }
                        None => self.fast.push_agent_task(user_id, &msg).await?,
                    }
                }
                Effect::EnqueueWorker { envelope } => {
                    self.fast.push_worker(&envelope).await?;
                }
                Effect::SyncStatus { session_id, phase, cause } => {
                    self.repos
                        .sessions
                        .set_status(
                            &session_id,
                            phase.status_str(),
                            cause.as_ref(),
                            self.clock.epoch_ms(),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Turn an agent dispatch into wire params. Login credentials are
    /// resolved here; plaintext never sits in a record or an effect.
    async fn materialize(
        &self,
        record: &SessionRecord,
        dispatch: AgentDispatch,
    ) -> Result<AgentTaskParams, EngineError> {
        Ok(match dispatch {
            AgentDispatch::Login => {
                let creds = self
                    .repos
                    .tenants
                    .credentials(record.network_id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::BadTaskArgs {
                            task: "login".into(),
                            detail: format!(
                                "no credentials stored for network {}",
                                record.network_id
                            ),
                        }
                    })?;
                let password = self
                    .vault
                    .decrypt_cached(
                        &creds.password_ciphertext,
                        record.tenant_id,
                        SecretKind::Password,
                        Some(record.network_id),
                    )
                    .await?;
                let totp_seed = match &creds.totp_seed_ciphertext {
                    Some(ciphertext) => Some(
                        self.vault
                            .decrypt_cached(
                                ciphertext,
                                record.tenant_id,
                                SecretKind::TotpSeed,
                                Some(record.network_id),
                            )
                            .await?,
                    ),
                    None => None,
                };
                AgentTaskParams::Login {
                    login_url: creds.login_url,
                    username: creds.username,
                    password,
                    totp_seed,
                    hints: creds.login_hints.or_else(|| record.route.login_hints.clone()),
                    stages: record
                        .healed_login_stages
                        .clone()
                        .or_else(|| record.route.login_stages.clone()),
                }
            }
            AgentDispatch::NavigateToForm { start_url, stages } => {
                AgentTaskParams::NavigateToForm { start_url, stages }
            }
            AgentDispatch::ExecStep { step } => AgentTaskParams::ExecStep { step },
            AgentDispatch::ExtractDom => AgentTaskParams::ExtractDom {},
            AgentDispatch::Logout { stages } => AgentTaskParams::Logout { stages },
        })
    }
}

#[cfg(test)]
#[path = "intake_tests.rs"]
mod tests;
