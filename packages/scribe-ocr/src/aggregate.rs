use serde::Serialize;

use crate::region::TextObservation;

/// Final recognized text for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrOutput {
    /// Top candidate of every observation, one per line.
    pub text: String,
    pub observations: Vec<TextObservation>,
}

impl OcrOutput {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Drops low-confidence candidates and assembles the output.
///
/// Engine order is kept. An observation whose candidates all fall below
/// `threshold` disappears; if nothing survives the output is simply empty.
pub fn aggregate(observations: Vec<TextObservation>, threshold: f32) -> OcrOutput {
    let threshold = if threshold.is_nan() {
        0.0
    } else {
        threshold.clamp(0.0, 1.0)
    };
    let observations: Vec<TextObservation> = observations
        .into_iter()
        .filter_map(|obs| obs.retain_confident(threshold))
        .collect();
    let text = observations
        .iter()
        .map(|obs| obs.top_candidate().text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    OcrOutput { text, observations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Candidate;

    #[test]
    fn single_confident_region() {
        let output = aggregate(
            vec![TextObservation::single("HELLO", 0.9, None).unwrap()],
            0.3,
        );
        assert_eq!(output.observations.len(), 1);
        assert_eq!(
            output.observations[0].candidates(),
            &[Candidate::new("HELLO", 0.9)]
        );
        assert_eq!(output.text, "HELLO");
    }

    #[test]
    fn weak_candidate_is_dropped() {
        let obs = TextObservation::new(
            None,
            vec![Candidate::new("WORLD", 0.8), Candidate::new("W0RLD", 0.2)],
        )
        .unwrap();
        let output = aggregate(vec![obs], 0.3);
        assert_eq!(
            output.observations[0].candidates(),
            &[Candidate::new("WORLD", 0.8)]
        );
    }

    #[test]
    fn nothing_found_is_success() {
        let output = aggregate(
            vec![
                TextObservation::single("noise", 0.1, None).unwrap(),
                TextObservation::single("blur", 0.05, None).unwrap(),
            ],
            0.3,
        );
        assert!(output.is_empty());
        assert_eq!(output.text, "");
    }

    #[test]
    fn keeps_engine_order_and_never_grows() {
        let input = vec![
            TextObservation::single("first", 0.6, None).unwrap(),
            TextObservation::single("dropped", 0.1, None).unwrap(),
            TextObservation::single("second", 0.3, None).unwrap(),
        ];
        let reported = input.len();
        let output = aggregate(input, 0.3);
        assert!(output.observations.len() <= reported);
        assert_eq!(output.text, "first\nsecond");
    }

    #[test]
    fn threshold_is_clamped() {
        let obs = || vec![TextObservation::single("x", 1.0, None).unwrap()];
        assert_eq!(aggregate(obs(), 7.0).observations.len(), 1);
        assert_eq!(aggregate(obs(), -1.0).observations.len(), 1);
    }
}
