// Card-creation flow around the slow automated card-entry workflow
// Progress shown while processing is simulated on a fixed tick and carries no correctness meaning

use crate::card_vault::CardVault;
use crate::models::{CardEntryFields, ProgressUpdate};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const SIMULATED_STEPS: &[(&str, u8)] = &[
    ("Initializing payment processing...", 5),
    ("Establishing secure connection...", 10),
    ("Validating payment gateway...", 15),
    ("Loading payment interface...", 20),
    ("Authenticating payment system...", 25),
    ("Authentication successful", 30),
    ("Preparing payment form...", 35),
    ("Configuring payment details...", 40),
    ("Payment details configured", 45),
    ("Opening payment form...", 50),
    ("Payment form ready", 55),
    ("Processing card information...", 60),
    ("Card information processed", 65),
    ("Validating security details...", 70),
    ("Security validation complete", 75),
    ("Submitting payment information...", 80),
    ("Payment information submitted", 85),
    ("Finalizing payment...", 90),
    ("Payment completed successfully", 100),
];

const DEFAULT_FAILURE_MESSAGE: &str = "Failed to create card";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardEntryError {
    #[error("Card creation is already in progress")]
    AlreadyProcessing,

    #[error("Cannot {action} while card creation is {step}")]
    InvalidTransition { action: &'static str, step: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationFailure {
    // The workflow answered with `success: false`
    Reported(String),
    // The call itself failed
    Exception(String),
}

impl CreationFailure {
    pub fn message(&self) -> &str {
        match self {
            CreationFailure::Reported(message) | CreationFailure::Exception(message) => message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationStep {
    Form,
    Processing,
    Succeeded {
        message: Option<String>,
        elapsed_ms: u64,
    },
    Failed(CreationFailure),
    Cancelled,
}

impl CreationStep {
    fn name(&self) -> &'static str {
        match self {
            CreationStep::Form => "form",
            CreationStep::Processing => "processing",
            CreationStep::Succeeded { .. } => "succeeded",
            CreationStep::Failed(_) => "failed",
            CreationStep::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardCreationState {
    pub step: CreationStep,
    pub progress: Vec<ProgressUpdate>,
}

impl CardCreationState {
    fn with_step(step: CreationStep) -> Self {
        Self {
            step,
            progress: Vec::new(),
        }
    }

    pub fn current(&self) -> Option<&ProgressUpdate> {
        self.progress.last()
    }

    pub fn percentage(&self) -> u8 {
        self.current().map_or(0, |update| update.percentage)
    }
}

// Owns one submission's ticker; dropping the submit future mid-flight counts as a cancel
struct Attempt {
    ticker: JoinHandle<()>,
    state: Arc<watch::Sender<CardCreationState>>,
    generation: Arc<AtomicU64>,
    started: u64,
}

impl Drop for Attempt {
    fn drop(&mut self) {
        self.ticker.abort();
        let current = &self.generation;
        let started = self.started;
        let abandoned = self.state.send_if_modified(|state| {
            if current.load(Ordering::SeqCst) != started || state.step != CreationStep::Processing {
                return false;
            }
            current.fetch_add(1, Ordering::SeqCst);
            state.step = CreationStep::Cancelled;
            true
        });
        if abandoned {
            debug!("Card creation abandoned before completion");
        }
    }
}

pub struct CardCreationFlow {
    vault: Arc<CardVault>,
    tick: Duration,
    state: Arc<watch::Sender<CardCreationState>>,
    // Bumped on every start and cancel; results from an older generation are dropped
    generation: Arc<AtomicU64>,
}

impl CardCreationFlow {
    pub fn new(vault: Arc<CardVault>, tick: Duration) -> Self {
        let (state, _) = watch::channel(CardCreationState::with_step(CreationStep::Form));
        Self {
            vault,
            tick,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CardCreationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> CardCreationState {
        self.state.borrow().clone()
    }

    // Runs the workflow to completion and returns the state it left the flow in
    pub async fn submit(
        &self,
        checkout_url: &str,
        fields: CardEntryFields,
        client_label: &str,
    ) -> Result<CardCreationState, CardEntryError> {
        let generation = self.begin()?;
        let attempt = Attempt {
            ticker: self.spawn_ticker(generation),
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            started: generation,
        };
        let started = Instant::now();

        info!(client_label, "Card creation started");
        let result = self
            .vault
            .request_card_creation(checkout_url, fields, client_label)
            .await;
        attempt.ticker.abort();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let current = Arc::clone(&self.generation);
        let applied = self.state.send_if_modified(|state| {
            if current.load(Ordering::SeqCst) != generation {
                return false;
            }
            match &result {
                Ok(outcome) if outcome.success => {
                    if !outcome.progress_updates.is_empty() {
                        state.progress = outcome.progress_updates.clone();
                    }
                    state.step = CreationStep::Succeeded {
                        message: outcome.message.clone(),
                        elapsed_ms,
                    };
                }
                Ok(outcome) => {
                    let message = outcome
                        .message
                        .clone()
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                    state.step = CreationStep::Failed(CreationFailure::Reported(message));
                }
                Err(error) => {
                    state.step = CreationStep::Failed(CreationFailure::Exception(error.to_string()));
                }
            }
            true
        });

        if applied {
            let state = self.state();
            match &state.step {
                CreationStep::Succeeded { .. } => info!(client_label, elapsed_ms, "Card created"),
                step => warn!(client_label, elapsed_ms, step = step.name(), "Card creation did not succeed"),
            }
            Ok(state)
        } else {
            info!(client_label, elapsed_ms, "Card creation finished after cancel, result discarded");
            Ok(self.state())
        }
    }

    // Stops waiting; the remote workflow keeps running and its result is ignored
    pub fn cancel(&self) -> bool {
        let current = Arc::clone(&self.generation);
        let cancelled = self.state.send_if_modified(|state| match state.step {
            CreationStep::Succeeded { .. } | CreationStep::Cancelled => false,
            _ => {
                current.fetch_add(1, Ordering::SeqCst);
                state.step = CreationStep::Cancelled;
                true
            }
        });
        if cancelled {
            debug!("Card creation cancelled");
        }
        cancelled
    }

    // Back to the entry form after a failure, keeping nothing from the failed attempt
    pub fn retry(&self) -> Result<(), CardEntryError> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if matches!(state.step, CreationStep::Failed(_)) {
                *state = CardCreationState::with_step(CreationStep::Form);
                true
            } else {
                rejected = Some(state.step.name());
                false
            }
        });

        match rejected {
            Some(step) => Err(CardEntryError::InvalidTransition {
                action: "retry",
                step,
            }),
            None => Ok(()),
        }
    }

    fn begin(&self) -> Result<u64, CardEntryError> {
        let current = Arc::clone(&self.generation);
        let mut started = None;
        let mut rejected = None;

        self.state.send_if_modified(|state| match state.step {
            CreationStep::Form | CreationStep::Cancelled | CreationStep::Succeeded { .. } => {
                started = Some(current.fetch_add(1, Ordering::SeqCst) + 1);
                *state = CardCreationState::with_step(CreationStep::Processing);
                true
            }
            CreationStep::Processing => {
                rejected = Some(CardEntryError::AlreadyProcessing);
                false
            }
            CreationStep::Failed(_) => {
                rejected = Some(CardEntryError::InvalidTransition {
                    action: "submit",
                    step: "failed",
                });
                false
            }
        });

        match (started, rejected) {
            (Some(generation), _) => Ok(generation),
            (None, Some(error)) => Err(error),
            (None, None) => Err(CardEntryError::AlreadyProcessing),
        }
    }

    fn spawn_ticker(&self, generation: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        let tick = self.tick;

        tokio::spawn(async move {
            for &(message, percentage) in SIMULATED_STEPS {
                tokio::time::sleep(tick).await;
                let advanced = state.send_if_modified(|state| {
                    if current.load(Ordering::SeqCst) != generation
                        || state.step != CreationStep::Processing
                    {
                        return false;
                    }
                    state.progress.push(ProgressUpdate {
                        message: message.to_string(),
                        percentage,
                        timestamp: Utc::now().timestamp_millis(),
                    });
                    true
                });
                if !advanced {
                    break;
                }
            }
        })
    }
}
