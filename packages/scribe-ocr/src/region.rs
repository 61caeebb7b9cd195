use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Region of the image in normalized coordinates, each axis in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Clamps every coordinate into the unit square.
    pub fn normalized(self) -> Self {
        let x = unit(self.x);
        let y = unit(self.y);
        Self {
            x,
            y,
            width: unit(self.width).min(1.0 - x),
            height: unit(self.height).min(1.0 - y),
        }
    }
}

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// One transcription proposed for a text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    #[error("observation has no candidates")]
    NoCandidates,
    #[error("confidence {0} is outside 0.0..=1.0")]
    ConfidenceOutOfRange(f32),
}

/// A recognized text region with its ranked candidates.
///
/// Candidates are always non-empty and ordered by descending confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservation")]
pub struct TextObservation {
    bounding_box: Option<BoundingBox>,
    candidates: Vec<Candidate>,
}

/// Unchecked wire form; deserialization goes through [`TextObservation::new`].
#[derive(Deserialize)]
struct RawObservation {
    bounding_box: Option<BoundingBox>,
    candidates: Vec<Candidate>,
}

impl TryFrom<RawObservation> for TextObservation {
    type Error = ObservationError;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        Self::new(raw.bounding_box, raw.candidates)
    }
}

impl TextObservation {
    pub fn new(
        bounding_box: Option<BoundingBox>,
        mut candidates: Vec<Candidate>,
    ) -> Result<Self, ObservationError> {
        if candidates.is_empty() {
            return Err(ObservationError::NoCandidates);
        }
        if let Some(bad) = candidates
            .iter()
            .find(|c| !(0.0..=1.0).contains(&c.confidence))
        {
            return Err(ObservationError::ConfidenceOutOfRange(bad.confidence));
        }
        // stable, so equal scores keep the engine's order
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(Self {
            bounding_box: bounding_box.map(BoundingBox::normalized),
            candidates,
        })
    }

    /// Convenience for a region with a single transcription.
    pub fn single(
        text: impl Into<String>,
        confidence: f32,
        bounding_box: Option<BoundingBox>,
    ) -> Result<Self, ObservationError> {
        Self::new(bounding_box, vec![Candidate::new(text, confidence)])
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn top_candidate(&self) -> &Candidate {
        &self.candidates[0]
    }

    /// Keeps only candidates at or above `threshold`; `None` when nothing survives.
    pub(crate) fn retain_confident(self, threshold: f32) -> Option<Self> {
        let candidates: Vec<Candidate> = self
            .candidates
            .into_iter()
            .filter(|c| c.confidence >= threshold)
            .collect();
        if candidates.is_empty() {
            None
        } else {
            Some(Self {
                bounding_box: self.bounding_box,
                candidates,
            })
        }
    }
}
