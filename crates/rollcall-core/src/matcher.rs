//! Match decisions between a reference embedding and sampled embeddings.
//!
//! A sample matches when both rules hold:
//! - comparator: `distance <= tolerance`
//! - confidence: `1 - distance > min_confidence`

use crate::types::{Embedding, MatchDecision};

pub const DEFAULT_TOLERANCE: f32 = 0.6;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_REQUIRED_MATCHES: u32 = 5;

/// Result of comparing one probe embedding against the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub distance: f32,
    /// `1 - distance`, clamped to [0, 1].
    pub confidence: f32,
    pub is_match: bool,
}

/// Strategy for comparing a probe embedding against a single reference.
pub trait Matcher {
    fn compare(&self, reference: &Embedding, probe: &Embedding) -> Comparison;
}

/// Euclidean-distance matcher with a comparator tolerance and a confidence floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceMatcher {
    pub tolerance: f32,
    pub min_confidence: f32,
}

impl Default for DistanceMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl Matcher for DistanceMatcher {
    fn compare(&self, reference: &Embedding, probe: &Embedding) -> Comparison {
        let Some(distance) = reference.euclidean_distance(probe) else {
            tracing::warn!(
                reference_len = reference.values.len(),
                probe_len = probe.values.len(),
                "embedding length mismatch, treating as non-match"
            );
            return Comparison {
                distance: f32::INFINITY,
                confidence: 0.0,
                is_match: false,
            };
        };
        let confidence = (1.0 - distance).clamp(0.0, 1.0);
        let is_match = distance <= self.tolerance && confidence > self.min_confidence;
        Comparison {
            distance,
            confidence,
            is_match,
        }
    }
}

/// Debounces per-frame comparisons: success only after `required`
/// consecutive matching frames. Any miss resets the run to zero.
#[derive(Debug, Clone)]
pub struct ConsecutiveMatcher<M = DistanceMatcher> {
    matcher: M,
    reference: Embedding,
    required: u32,
    consecutive: u32,
    best_confidence: f32,
}

impl<M: Matcher> ConsecutiveMatcher<M> {
    pub fn new(matcher: M, reference: Embedding, required: u32) -> Self {
        Self {
            matcher,
            reference,
            // A requirement of zero would accept without ever seeing a face.
            required: required.max(1),
            consecutive: 0,
            best_confidence: 0.0,
        }
    }

    /// Feed one frame's embedding, or `None` when the frame had no usable face.
    pub fn observe(&mut self, probe: Option<&Embedding>) -> MatchDecision {
        let Some(probe) = probe else {
            return self.miss();
        };

        let cmp = self.matcher.compare(&self.reference, probe);
        if cmp.confidence > self.best_confidence {
            self.best_confidence = cmp.confidence;
        }

        if cmp.is_match {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }

        tracing::debug!(
            distance = cmp.distance,
            confidence = cmp.confidence,
            is_match = cmp.is_match,
            consecutive = self.consecutive,
            "frame compared"
        );

        MatchDecision {
            is_match: cmp.is_match,
            confidence: cmp.confidence,
            consecutive_count: self.consecutive,
        }
    }

    /// Record a frame without a usable face.
    pub fn miss(&mut self) -> MatchDecision {
        self.consecutive = 0;
        MatchDecision {
            is_match: false,
            confidence: 0.0,
            consecutive_count: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.consecutive >= self.required
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn best_confidence(&self) -> f32 {
        self.best_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_identical_embeddings_full_confidence() {
        let a = emb(&[0.3, 0.1, -0.2, 0.35]);
        let cmp = DistanceMatcher::default().compare(&a, &a.clone());
        assert_eq!(cmp.distance, 0.0);
        assert!((cmp.confidence - 1.0).abs() < 1e-6);
        assert!(cmp.is_match);
    }

    #[test]
    fn test_different_people_below_threshold() {
        // Half-norm embeddings pointing in orthogonal directions: distance ~0.707.
        let a = emb(&[0.5, 0.0, 0.0]);
        let b = emb(&[0.0, 0.5, 0.0]);
        let matcher = DistanceMatcher::default();
        let cmp = matcher.compare(&a, &b);
        assert!(cmp.confidence < matcher.min_confidence);
        assert!(!cmp.is_match);
    }

    #[test]
    fn test_confidence_clamped_to_zero() {
        let a = emb(&[0.5, 0.0]);
        let b = emb(&[-0.5, 0.0]);
        let cmp = DistanceMatcher::default().compare(&a, &b);
        assert!((cmp.distance - 1.0).abs() < 1e-6);
        assert_eq!(cmp.confidence, 0.0);

        let far = emb(&[3.0, 4.0]);
        let cmp = DistanceMatcher::default().compare(&a, &far);
        assert_eq!(cmp.confidence, 0.0);
    }

    #[test]
    fn test_both_rules_required() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[0.45, 0.0]); // distance 0.45, confidence 0.55

        // Passes confidence but fails a tight comparator.
        let tight = DistanceMatcher { tolerance: 0.4, min_confidence: 0.5 };
        assert!(!tight.compare(&a, &b).is_match);

        // Passes comparator but fails the confidence floor.
        let strict = DistanceMatcher { tolerance: 0.6, min_confidence: 0.6 };
        assert!(!strict.compare(&a, &b).is_match);

        assert!(DistanceMatcher::default().compare(&a, &b).is_match);
    }

    #[test]
    fn test_length_mismatch_never_matches() {
        let reference = emb(&[0.5, 0.0, 0.0]);
        let prefix = emb(&[0.5, 0.0]);
        let cmp = DistanceMatcher::default().compare(&reference, &prefix);
        assert!(!cmp.is_match);
        assert_eq!(cmp.confidence, 0.0);
        assert!(cmp.distance.is_infinite());

        let mut run = ConsecutiveMatcher::new(DistanceMatcher::default(), reference, 1);
        assert_eq!(run.observe(Some(&prefix)).consecutive_count, 0);
        assert!(!run.is_complete());
    }

    #[test]
    fn test_confidence_threshold_is_exclusive() {
        let a = emb(&[0.0]);
        let b = emb(&[0.5]); // confidence exactly 0.5
        let cmp = DistanceMatcher::default().compare(&a, &b);
        assert!((cmp.confidence - 0.5).abs() < 1e-6);
        assert!(!cmp.is_match);
    }

    #[test]
    fn test_consecutive_counter_reaches_required() {
        let reference = emb(&[0.5, 0.0]);
        let mut run = ConsecutiveMatcher::new(DistanceMatcher::default(), reference.clone(), 3);

        for expected in 1..=3 {
            assert!(!run.is_complete());
            let d = run.observe(Some(&reference));
            assert!(d.is_match);
            assert_eq!(d.consecutive_count, expected);
        }
        assert!(run.is_complete());
        assert!((run.best_confidence() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_consecutive_counter_resets_on_non_match() {
        let reference = emb(&[0.5, 0.0]);
        let stranger = emb(&[0.0, 0.5]);
        let mut run = ConsecutiveMatcher::new(DistanceMatcher::default(), reference.clone(), 3);

        run.observe(Some(&reference));
        run.observe(Some(&reference));
        assert_eq!(run.consecutive(), 2);

        let d = run.observe(Some(&stranger));
        assert!(!d.is_match);
        assert_eq!(d.consecutive_count, 0);
        assert_eq!(run.consecutive(), 0);

        run.observe(Some(&reference));
        assert_eq!(run.consecutive(), 1);
        assert!(!run.is_complete());
    }

    #[test]
    fn test_consecutive_counter_resets_on_missing_face() {
        let reference = emb(&[0.5, 0.0]);
        let mut run = ConsecutiveMatcher::new(DistanceMatcher::default(), reference.clone(), 2);

        run.observe(Some(&reference));
        let d = run.observe(None);
        assert!(!d.is_match);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(run.consecutive(), 0);
    }

    #[test]
    fn test_best_confidence_survives_reset() {
        let reference = emb(&[0.0, 0.0]);
        let close = emb(&[0.2, 0.0]);
        let far = emb(&[0.9, 0.0]);
        let mut run = ConsecutiveMatcher::new(DistanceMatcher::default(), reference, 5);

        run.observe(Some(&close));
        run.observe(Some(&far));
        run.miss();
        assert!((run.best_confidence() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_zero_required_treated_as_one() {
        let reference = emb(&[0.5]);
        let run = ConsecutiveMatcher::new(DistanceMatcher::default(), reference, 0);
        assert_eq!(run.required(), 1);
        assert!(!run.is_complete());
    }
}
