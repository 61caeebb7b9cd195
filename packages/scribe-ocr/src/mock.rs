//! Deterministic backend for exercising the request pipeline without a real
//! OCR model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::decoder::DecodedImage;
use crate::engine::{EngineError, RecognitionEngine, RecognitionOptions};
use crate::port::Recognition;
use crate::region::TextObservation;

/// What the engine does on one invocation.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(Recognition),
    Delay(Duration, Recognition),
    /// Never completes.
    Hang,
    Panic,
}

/// Replays a script of [`Step`]s, one per invocation. The last step repeats
/// once the script runs out.
#[derive(Debug)]
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<Step>>,
    invocations: AtomicUsize,
    completions: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            invocations: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
        }
    }

    pub fn with_observations(observations: Vec<TextObservation>) -> Self {
        Self::new(vec![Step::Respond(Ok(observations))])
    }

    /// Reports one region holding `text`.
    pub fn with_text(text: &str, confidence: f32) -> Self {
        let observation = TextObservation::single(text, confidence, None)
            .unwrap_or_else(|e| panic!("invalid scripted observation: {e}"));
        Self::with_observations(vec![observation])
    }

    pub fn failing(error: EngineError) -> Self {
        Self::new(vec![Step::Respond(Err(error))])
    }

    pub fn hanging() -> Self {
        Self::new(vec![Step::Hang])
    }

    /// Times `recognize` was called.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Times `recognize` ran to the end and returned.
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        if steps.len() > 1 {
            steps.pop_front().unwrap_or(Step::Hang)
        } else {
            steps.front().cloned().unwrap_or(Step::Hang)
        }
    }
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn recognize(
        &self,
        _image: &DecodedImage,
        _options: &RecognitionOptions,
    ) -> Result<Vec<TextObservation>, EngineError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.next_step() {
            Step::Respond(outcome) => outcome,
            Step::Delay(delay, outcome) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            Step::Hang => std::future::pending().await,
            Step::Panic => panic!("scripted engine panic"),
        };
        self.completions.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}
