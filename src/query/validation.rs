use super::{ObjectConstraint, Query, RawObjectConstraint, RawQuery};
use crate::error::ValidationError;
use std::collections::HashMap;

/// Validate a raw query into its canonical form.
///
/// All violations are collected; the query is rejected if any exist.
pub fn validate(raw: &RawQuery) -> Result<Query, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut objects = Vec::with_capacity(raw.objects.len());

    for (i, object) in raw.objects.iter().enumerate() {
        let label = object.label.trim();

        if label.is_empty() {
            errors.push(ValidationError::new(
                format!("objects[{i}].label"),
                "Label cannot be empty",
            ));
        } else if let Some(first) = first_seen.get(label) {
            errors.push(ValidationError::new(
                format!("objects[{i}].label"),
                format!("Duplicate label '{label}' (already constrained at objects[{first}])"),
            ));
        } else {
            first_seen.insert(label.to_string(), i);
        }

        if let Some(constraint) = validate_constraint(i, label, object, &mut errors) {
            objects.push(constraint);
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    objects.sort_by(|a, b| a.label.cmp(&b.label));

    let audio_tag = raw
        .audio
        .as_deref()
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string);

    Ok(Query {
        description: raw.description.trim().to_string(),
        objects,
        audio_tag,
    })
}

fn validate_constraint(
    i: usize,
    label: &str,
    object: &RawObjectConstraint,
    errors: &mut Vec<ValidationError>,
) -> Option<ObjectConstraint> {
    let before = errors.len();

    if !(0.0..=1.0).contains(&object.confidence) {
        errors.push(ValidationError::new(
            format!("objects[{i}].confidence"),
            format!(
                "Confidence threshold must be within [0, 1], got {}",
                object.confidence
            ),
        ));
    }

    let min_instances = match u32::try_from(object.min_instances) {
        Ok(min) => Some(min),
        Err(_) => {
            let message = if object.min_instances < 0 {
                format!("min_instances cannot be negative, got {}", object.min_instances)
            } else {
                format!("min_instances is too large: {}", object.min_instances)
            };
            errors.push(ValidationError::new(
                format!("objects[{i}].min_instances"),
                message,
            ));
            None
        }
    };

    let max_instances = match object.max_instances {
        None => None,
        Some(max) if max < object.min_instances => {
            errors.push(ValidationError::new(
                format!("objects[{i}].max_instances"),
                format!(
                    "max_instances ({max}) must be >= min_instances ({})",
                    object.min_instances
                ),
            ));
            None
        }
        // max >= min >= 0 here whenever min itself was valid
        Some(max) => Some(u32::try_from(max).unwrap_or(u32::MAX)),
    };

    if errors.len() > before || label.is_empty() {
        return None;
    }

    Some(ObjectConstraint {
        label: label.to_string(),
        confidence_threshold: object.confidence as f32,
        min_instances: min_instances?,
        max_instances,
    })
}
