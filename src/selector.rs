use std::collections::HashMap;

use crate::{UnknownFieldPolicy, UploadField, ValidationError};

/// Decision for one incoming file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorAction {
    /// Accept the file into the declared field at this index.
    Accept(usize),
    /// Drop the file.
    Ignore,
}

/// Per-request field matcher with runtime counters.
#[derive(Debug, Clone)]
pub struct SelectorEngine {
    unknown_field_policy: UnknownFieldPolicy,
    positions: HashMap<String, usize>,
    max_counts: Vec<Option<usize>>,
    counts: Vec<usize>,
}

impl SelectorEngine {
    /// Creates a matcher for the given declared fields.
    pub fn new(fields: &[UploadField], unknown_field_policy: UnknownFieldPolicy) -> Self {
        let positions = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name().to_owned(), index))
            .collect();
        Self {
            unknown_field_policy,
            positions,
            max_counts: fields
                .iter()
                .map(|field| field.cardinality().max_count())
                .collect(),
            counts: vec![0; fields.len()],
        }
    }

    /// Matches a file field name and records it against the field's limit.
    pub fn evaluate(&mut self, field_name: &str) -> Result<SelectorAction, ValidationError> {
        let Some(&index) = self.positions.get(field_name) else {
            return match self.unknown_field_policy {
                UnknownFieldPolicy::Reject => Err(ValidationError::UnexpectedField {
                    field: field_name.to_owned(),
                }),
                UnknownFieldPolicy::Ignore => Ok(SelectorAction::Ignore),
            };
        };

        let next = self.counts[index] + 1;
        if let Some(max_count) = self.max_counts[index] {
            if next > max_count {
                return Err(ValidationError::TooManyFiles {
                    field: field_name.to_owned(),
                    max_count,
                });
            }
        }
        self.counts[index] = next;
        Ok(SelectorAction::Accept(index))
    }

    /// Files accepted so far for the field at `index`.
    pub fn count(&self, index: usize) -> usize {
        self.counts.get(index).copied().unwrap_or(0)
    }
}
