//! Detection filter evaluation
//!
//! Decides whether a keyframe's detection record satisfies every object
//! constraint of a query. Pure functions, no shared state.

use super::DetectedInstance;
use crate::query::ObjectConstraint;
use ahash::{HashMap, HashMapExt};

/// Detections of one record grouped by label.
///
/// Built once per record so each constraint only scans the confidences of its
/// own label instead of the whole detection list.
#[derive(Debug, Default)]
pub struct LabelGroups<'a> {
    by_label: HashMap<&'a str, Vec<f32>>,
}

impl<'a> LabelGroups<'a> {
    pub fn new(detections: &'a [DetectedInstance]) -> Self {
        let mut by_label: HashMap<&'a str, Vec<f32>> = HashMap::new();
        for detection in detections {
            by_label
                .entry(detection.label.as_str())
                .or_default()
                .push(detection.confidence);
        }
        Self { by_label }
    }

    /// Number of instances of `label` detected with `confidence >= threshold`
    pub fn count_at_least(&self, label: &str, threshold: f32) -> usize {
        self.by_label
            .get(label)
            .map(|confidences| confidences.iter().filter(|&&c| c >= threshold).count())
            .unwrap_or(0)
    }
}

/// Evaluate a detection record against a constraint set.
///
/// Passes iff every constraint passes. An empty constraint set always passes.
pub fn evaluate(detections: &[DetectedInstance], constraints: &[ObjectConstraint]) -> bool {
    if constraints.is_empty() {
        return true;
    }

    let groups = LabelGroups::new(detections);
    constraints.iter().all(|constraint| {
        let count = groups.count_at_least(&constraint.label, constraint.confidence_threshold);
        constraint.admits(count)
    })
}

/// Evaluate a possibly-missing detection record.
///
/// A keyframe with no stored record cannot confirm any object presence, so it
/// fails whenever at least one constraint is present.
pub fn passes(detections: Option<&[DetectedInstance]>, constraints: &[ObjectConstraint]) -> bool {
    match detections {
        Some(detections) => evaluate(detections, constraints),
        None => constraints.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(label: &str, confidence: f32, min: u32, max: Option<u32>) -> ObjectConstraint {
        ObjectConstraint {
            label: label.to_string(),
            confidence_threshold: confidence,
            min_instances: min,
            max_instances: max,
        }
    }

    fn cars() -> Vec<DetectedInstance> {
        vec![
            DetectedInstance::new("car", 0.9),
            DetectedInstance::new("car", 0.6),
            DetectedInstance::new("car", 0.2),
        ]
    }

    #[test]
    fn test_min_instances_counts_only_confident_detections() {
        let detections = cars();
        assert!(evaluate(&detections, &[constraint("car", 0.5, 2, None)]));
        assert!(!evaluate(&detections, &[constraint("car", 0.5, 3, None)]));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let detections = cars();
        assert!(evaluate(&detections, &[constraint("car", 0.6, 2, Some(2))]));
    }

    #[test]
    fn test_max_instances() {
        let detections = cars();
        assert!(evaluate(&detections, &[constraint("car", 0.1, 1, Some(3))]));
        assert!(!evaluate(&detections, &[constraint("car", 0.1, 1, Some(2))]));
    }

    #[test]
    fn test_missing_label_fails_when_required() {
        let detections = cars();
        assert!(!evaluate(&detections, &[constraint("dog", 0.0, 1, None)]));
    }

    #[test]
    fn test_min_zero_without_max_always_passes() {
        let detections = cars();
        assert!(evaluate(&detections, &[constraint("dog", 0.9, 0, None)]));
        assert!(evaluate(&[], &[constraint("dog", 0.9, 0, None)]));
    }

    #[test]
    fn test_min_zero_max_zero_means_absent() {
        let detections = cars();
        assert!(evaluate(&detections, &[constraint("dog", 0.5, 0, Some(0))]));
        assert!(!evaluate(&detections, &[constraint("car", 0.5, 0, Some(0))]));
    }

    #[test]
    fn test_constraints_are_conjunctive() {
        let mut detections = cars();
        detections.push(DetectedInstance::new("person", 0.8));

        let both = [
            constraint("car", 0.5, 1, None),
            constraint("person", 0.7, 1, None),
        ];
        assert!(evaluate(&detections, &both));

        let one_fails = [
            constraint("car", 0.5, 1, None),
            constraint("person", 0.9, 1, None),
        ];
        assert!(!evaluate(&detections, &one_fails));
    }

    #[test]
    fn test_empty_constraints_pass() {
        assert!(evaluate(&[], &[]));
        assert!(evaluate(&cars(), &[]));
    }

    #[test]
    fn test_missing_record() {
        assert!(passes(None, &[]));
        assert!(!passes(None, &[constraint("car", 0.0, 0, None)]));
        assert!(passes(Some(&cars()), &[constraint("car", 0.5, 1, None)]));
    }

    #[test]
    fn test_label_groups_count() {
        let detections = cars();
        let groups = LabelGroups::new(&detections);
        assert_eq!(groups.count_at_least("car", 0.0), 3);
        assert_eq!(groups.count_at_least("car", 0.95), 0);
        assert_eq!(groups.count_at_least("bus", 0.0), 0);
    }
}
