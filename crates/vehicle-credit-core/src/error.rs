use thiserror::Error;
use uuid::Uuid;

use crate::types::{LoanStatus, Money};

#[derive(Debug, Error)]
pub enum VehicleCreditError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Overpayment: loan {loan_id} has no remaining installments")]
    Overpayment { loan_id: Uuid },

    #[error("Payment of {amount} exceeds the remaining debt {debt_remaining} on loan {loan_id}")]
    ExceedsDebt {
        loan_id: Uuid,
        amount: Money,
        debt_remaining: Money,
    },

    #[error("Already closed: installments {installment_ids:?} belong to an existing closing")]
    AlreadyClosed { installment_ids: Vec<Uuid> },

    #[error("Not found: {entity} {id}")]
    NotFound { entity: String, id: Uuid },

    #[error("Inactive loan: {loan_id} is {status:?}")]
    InactiveLoan { loan_id: Uuid, status: LoanStatus },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl VehicleCreditError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        VehicleCreditError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: Uuid) -> Self {
        VehicleCreditError::NotFound {
            entity: entity.into(),
            id,
        }
    }
}

impl From<serde_json::Error> for VehicleCreditError {
    fn from(e: serde_json::Error) -> Self {
        VehicleCreditError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for VehicleCreditError {
    fn from(e: std::io::Error) -> Self {
        VehicleCreditError::Storage(e.to_string())
    }
}
