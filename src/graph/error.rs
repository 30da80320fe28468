//! Graph-specific error types.

use crate::graph::id::{ElementId, SlotRef};
use crate::graph::slot::DataRole;
use crate::types::DataKind;
use thiserror::Error;

/// Reasons a data or trigger connection is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("cannot connect {source_role} slot to {target_role} slot")]
    RoleMismatch {
        source_role: DataRole,
        target_role: DataRole,
    },

    #[error("type mismatch: {from} produces {produced}, {to} expects {expected}")]
    TypeMismatch {
        from: SlotRef,
        to: SlotRef,
        produced: DataKind,
        expected: DataKind,
    },

    #[error("output of element {0} cannot feed its own input without a buffer slot")]
    SelfLoop(ElementId),

    #[error("connection closes a cycle without a buffer slot: {}", format_path(.path))]
    Cycle { path: Vec<ElementId> },

    #[error("slot {0} is already connected")]
    AlreadyConnected(SlotRef),

    #[error("no connection from {from} to {to}")]
    NotConnected { from: SlotRef, to: SlotRef },

    #[error("slot promotion resolves back to itself: {0}")]
    PromotionCycle(SlotRef),

    #[error("element {0} cannot act as a trigger source")]
    InvalidTriggerSource(ElementId),

    #[error("element {0} cannot listen to triggers")]
    InvalidListener(ElementId),

    #[error("trigger {0} already has a driver")]
    DriverAlreadySet(ElementId),

    #[error("trigger connection {from} -> {listener} already exists")]
    DuplicateTrigger {
        from: ElementId,
        listener: ElementId,
    },
}

fn format_path(path: &[ElementId]) -> String {
    path.iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised by a kernel's `compute()`.
///
/// Always caught at the step boundary; see `Step::on_trigger`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    #[error("no {role} slot named '{name}'")]
    MissingSlot { role: DataRole, name: String },

    #[error("slot '{name}' holds {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: DataKind,
        found: DataKind,
    },

    #[error("slots '{0}' and '{1}' share the same data object")]
    Aliased(String, String),

    #[error("{0}")]
    Failed(String),

    #[error("compute panicked: {0}")]
    Panicked(String),
}

impl ComputeError {
    pub fn failed(message: impl Into<String>) -> Self {
        ComputeError::Failed(message.into())
    }
}

/// Errors that can occur within the graph engine.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Duplicate name: {role} '{name}' already declared")]
    DuplicateName { role: String, name: String },

    #[error("Step '{step}' failed: {source}")]
    Compute {
        step: String,
        #[source]
        source: ComputeError,
    },

    #[error("Thread lifecycle error: {0}")]
    ThreadLifecycle(String),

    #[error("Unknown kernel type: {0}")]
    UnknownKernel(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl GraphError {
    pub fn not_found(what: impl Into<String>) -> Self {
        GraphError::NotFound { what: what.into() }
    }

    pub fn duplicate(role: impl ToString, name: impl Into<String>) -> Self {
        GraphError::DuplicateName {
            role: role.to_string(),
            name: name.into(),
        }
    }
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = ConnectionError::Cycle {
            path: vec![ElementId(1), ElementId(2), ElementId(1)],
        };
        assert_eq!(
            err.to_string(),
            "connection closes a cycle without a buffer slot: 1 -> 2 -> 1"
        );
    }

    #[test]
    fn test_graph_error_from_connection() {
        let err: GraphError = ConnectionError::SelfLoop(ElementId(4)).into();
        assert!(matches!(err, GraphError::Connection(_)));
        assert!(err.to_string().contains("element ElementId(4)"));
    }

    #[test]
    fn test_endpoint_errors_have_no_source() {
        use std::error::Error as _;

        let mismatch = ConnectionError::TypeMismatch {
            from: SlotRef::output(ElementId(0), "out"),
            to: SlotRef::input(ElementId(1), "in"),
            produced: DataKind::Vector,
            expected: DataKind::Scalar,
        };
        assert_eq!(
            mismatch.to_string(),
            "type mismatch: 0.out[output] produces vector, 1.in[input] expects scalar"
        );
        assert!(mismatch.source().is_none());

        let missing = ConnectionError::NotConnected {
            from: SlotRef::output(ElementId(0), "out"),
            to: SlotRef::input(ElementId(1), "in"),
        };
        assert!(missing.source().is_none());

        let duplicate = ConnectionError::DuplicateTrigger {
            from: ElementId(2),
            listener: ElementId(3),
        };
        assert_eq!(
            duplicate.to_string(),
            "trigger connection ElementId(2) -> ElementId(3) already exists"
        );
    }

    #[test]
    fn test_duplicate_name_display() {
        let err = GraphError::duplicate(DataRole::Input, "in");
        assert_eq!(err.to_string(), "Duplicate name: input 'in' already declared");
    }
}
