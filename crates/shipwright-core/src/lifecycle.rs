use crate::operation::OperationStatus;
use crate::CoreError;

/// Operations only move forward: `pending -> running -> completed | failed`.
pub fn validate_transition(from: OperationStatus, to: OperationStatus) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (OperationStatus::Pending, OperationStatus::Running)
            | (
                OperationStatus::Running,
                OperationStatus::Completed | OperationStatus::Failed
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
