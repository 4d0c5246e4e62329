//! Receipt payload for a recorded payment. Layout and printing belong to the
//! renderer; this only gathers the figures it needs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VehicleCreditError;
use crate::loan::{Installment, Loan};
use crate::payments::{day_offset, timing_of};
use crate::types::{InstallmentId, LoanId, LoanStatus, Money, PaymentMethod, PaymentTiming, StoreId};
use crate::VehicleCreditResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub installment_id: InstallmentId,
    pub loan_id: LoanId,
    pub store_id: StoreId,
    pub client_id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle_type: String,
    pub sequence: u32,
    pub of_installments: u32,
    /// Running counts as they stood when this payment was recorded, so a
    /// reprint matches the original receipt.
    pub paid_installments: u32,
    pub amount: Money,
    pub fee: Money,
    pub total_charged: Money,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub due_date: NaiveDate,
    pub timing: PaymentTiming,
    /// Days overdue (positive) or ahead (negative), measured on `issued_on`.
    pub day_offset: i64,
    pub remaining_installments: u32,
    pub debt_remaining: Money,
    pub loan_status: LoanStatus,
    pub notes: String,
    pub issued_on: NaiveDate,
}

pub fn build_receipt(
    loan: &Loan,
    installment: &Installment,
    today: NaiveDate,
) -> VehicleCreditResult<Receipt> {
    if installment.loan_id != loan.id {
        return Err(VehicleCreditError::not_found("installment", installment.id));
    }

    Ok(Receipt {
        installment_id: installment.id,
        loan_id: loan.id,
        store_id: loan.store_id,
        client_id: loan.client_id,
        vehicle_id: loan.vehicle_id,
        vehicle_type: loan.vehicle_type.clone(),
        sequence: installment.sequence,
        of_installments: loan.original_installments,
        paid_installments: installment.paid_installments_after,
        amount: installment.amount,
        fee: installment.fee,
        total_charged: installment.amount + installment.fee,
        method: installment.method,
        payment_date: installment.payment_date,
        due_date: installment.due_date,
        timing: timing_of(installment),
        day_offset: day_offset(installment, today),
        remaining_installments: installment.remaining_installments_after,
        debt_remaining: installment.debt_remaining_after,
        loan_status: loan.status,
        notes: installment.notes.clone(),
        issued_on: today,
    })
}
