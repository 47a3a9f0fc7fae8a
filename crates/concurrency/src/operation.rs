//! Operation log entries and their compensations
//!
//! An [`Operation`] records one intended mutation before it is sent. Once it
//! has executed, [`Operation::compensation`] derives the call shape that
//! undoes it:
//!
//! | Operation | Compensation |
//! |-----------|--------------|
//! | CREATE | UNLINK of the ids the server assigned (none if they are unknown) |
//! | WRITE | WRITE of the captured pre-image, per record |
//! | UNLINK | none (irreversible) |

use remtx_core::{FieldValues, OperationKind, RecordId};

/// Field values captured before a WRITE, one entry per record, in id order
pub type PreImage = Vec<(RecordId, FieldValues)>;

/// One intended mutation of remote records
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub(crate) kind: OperationKind,
    pub(crate) model: String,
    pub(crate) record_ids: Vec<RecordId>,
    pub(crate) payload: FieldValues,
    pub(crate) pre_image: Option<PreImage>,
    pub(crate) executed: bool,
}

impl Operation {
    /// New, unexecuted operation
    ///
    /// Duplicate record ids are dropped, keeping the first occurrence.
    pub fn new(
        kind: OperationKind,
        model: impl Into<String>,
        record_ids: impl IntoIterator<Item = RecordId>,
        payload: FieldValues,
    ) -> Self {
        let mut ids: Vec<RecordId> = Vec::new();
        for id in record_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Operation {
            kind,
            model: model.into(),
            record_ids: ids,
            payload,
            pre_image: None,
            executed: false,
        }
    }

    /// Kind of mutation
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Remote model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Affected record ids; for CREATE, filled in once executed
    pub fn record_ids(&self) -> &[RecordId] {
        &self.record_ids
    }

    /// Field values sent with CREATE/WRITE
    pub fn payload(&self) -> &FieldValues {
        &self.payload
    }

    /// Values captured before a WRITE executed
    pub fn pre_image(&self) -> Option<&PreImage> {
        self.pre_image.as_ref()
    }

    /// Whether the operation was successfully sent
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Field names a pre-image read must request
    pub(crate) fn payload_fields(&self) -> Vec<String> {
        self.payload.keys().cloned().collect()
    }

    /// The action that undoes this operation, if it executed
    pub fn compensation(&self) -> Option<Compensation> {
        if !self.executed {
            return None;
        }
        let compensation = match self.kind {
            OperationKind::Create if self.record_ids.is_empty() => Compensation::Irreversible {
                model: self.model.clone(),
                record_ids: Vec::new(),
            },
            OperationKind::Create => Compensation::Unlink {
                model: self.model.clone(),
                record_ids: self.record_ids.clone(),
            },
            OperationKind::Write => match &self.pre_image {
                Some(pre_image) => Compensation::Restore {
                    model: self.model.clone(),
                    records: pre_image.clone(),
                },
                None => Compensation::Irreversible {
                    model: self.model.clone(),
                    record_ids: self.record_ids.clone(),
                },
            },
            OperationKind::Unlink => Compensation::Irreversible {
                model: self.model.clone(),
                record_ids: self.record_ids.clone(),
            },
        };
        Some(compensation)
    }
}

/// Action undoing an executed operation
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Delete records a CREATE produced
    Unlink {
        /// Remote model
        model: String,
        /// Ids the server assigned
        record_ids: Vec<RecordId>,
    },
    /// Write back the values a WRITE overwrote
    Restore {
        /// Remote model
        model: String,
        /// Pre-image per record
        records: PreImage,
    },
    /// Nothing can undo this operation
    Irreversible {
        /// Remote model
        model: String,
        /// Affected records
        record_ids: Vec<RecordId>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: serde_json::Value) -> FieldValues {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn record_ids_are_an_ordered_set() {
        let op = Operation::new(OperationKind::Unlink, "res.partner", [3, 1, 3, 2, 1], FieldValues::new());
        assert_eq!(op.record_ids(), &[3, 1, 2]);
    }

    #[test]
    fn unexecuted_operation_has_no_compensation() {
        let op = Operation::new(OperationKind::Create, "res.partner", [], values(json!({"name": "A"})));
        assert!(op.compensation().is_none());
    }

    #[test]
    fn create_compensates_to_unlink_of_assigned_ids() {
        let mut op = Operation::new(OperationKind::Create, "res.partner", [], values(json!({"name": "A"})));
        op.record_ids = vec![42];
        op.executed = true;

        assert_eq!(
            op.compensation(),
            Some(Compensation::Unlink {
                model: "res.partner".to_string(),
                record_ids: vec![42],
            })
        );
    }

    #[test]
    fn create_without_known_ids_is_irreversible() {
        let mut op = Operation::new(OperationKind::Create, "res.partner", [], values(json!({"name": "A"})));
        op.executed = true;
        assert!(matches!(op.compensation(), Some(Compensation::Irreversible { .. })));
    }

    #[test]
    fn write_compensates_to_pre_image_restore() {
        let mut op = Operation::new(
            OperationKind::Write,
            "res.partner",
            [7, 8],
            values(json!({"name": "New"})),
        );
        op.pre_image = Some(vec![
            (7, values(json!({"name": "Old 7"}))),
            (8, values(json!({"name": "Old 8"}))),
        ]);
        op.executed = true;

        match op.compensation() {
            Some(Compensation::Restore { model, records }) => {
                assert_eq!(model, "res.partner");
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].1, values(json!({"name": "Old 7"})));
            }
            other => panic!("expected restore, got {:?}", other),
        }
    }

    #[test]
    fn unlink_is_irreversible() {
        let mut op = Operation::new(OperationKind::Unlink, "res.partner", [5], FieldValues::new());
        op.executed = true;
        assert!(matches!(op.compensation(), Some(Compensation::Irreversible { .. })));
    }

    #[test]
    fn payload_fields_follow_payload_keys() {
        let op = Operation::new(
            OperationKind::Write,
            "res.partner",
            [1],
            values(json!({"email": "a@b.c", "name": "A"})),
        );
        let mut fields = op.payload_fields();
        fields.sort();
        assert_eq!(fields, vec!["email".to_string(), "name".to_string()]);
    }
}
