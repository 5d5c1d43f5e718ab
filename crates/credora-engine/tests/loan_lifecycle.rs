//! Loan lifecycle: offers, fees, approval, disbursement and deletion

mod common;

use common::Harness;
use credora_engine::{FeeRequest, LoanRequest};
use credora_ledger::LedgerStore;
use credora_types::{metadata_keys, CredoraError, LoanStatus, Metadata, OfferResponse, TransactionStatus};
use rust_decimal_macros::dec;

fn request(amount: rust_decimal::Decimal) -> LoanRequest {
    LoanRequest {
        amount,
        currency: None,
        duration_months: 12,
        purpose: "Working capital".to_string(),
    }
}

#[tokio::test]
async fn test_accepted_offer_replaces_amount_at_approval() {
    let h = Harness::new();
    let customer = h.customer();

    let loan = h.engine.apply_for_loan(&customer, request(dec!(12000))).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);

    let loan = h
        .engine
        .propose_offer(&h.admin, loan.id, dec!(10000), Some("Reduced limit".to_string()))
        .await
        .unwrap();
    assert!(loan.offer.as_ref().unwrap().is_awaiting_response());

    h.engine
        .respond_to_offer(&customer, loan.id, OfferResponse::Accept)
        .await
        .unwrap();
    let approved = h.engine.approve_loan(&h.admin, loan.id).await.unwrap();

    assert_eq!(approved.status, LoanStatus::Approved);
    assert_eq!(approved.amount, dec!(10000));
    assert_eq!(approved.interest_rate, Some(dec!(5.5)));
    assert_eq!(approved.monthly_payment, Some(dec!(858.37)));
    assert!(approved.offer.is_none());
    assert!(approved.next_payment_due.is_some());
}

#[tokio::test]
async fn test_declined_offer_keeps_requested_amount_and_allows_new_offer() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(12000))).await.unwrap();

    h.engine.propose_offer(&h.admin, loan.id, dec!(8000), None).await.unwrap();
    // A second offer while the first awaits an answer is refused
    let err = h.engine.propose_offer(&h.admin, loan.id, dec!(9000), None).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));

    h.engine
        .respond_to_offer(&customer, loan.id, OfferResponse::Decline)
        .await
        .unwrap();
    h.engine.propose_offer(&h.admin, loan.id, dec!(9000), None).await.unwrap();
    h.engine
        .respond_to_offer(&customer, loan.id, OfferResponse::Decline)
        .await
        .unwrap();

    let approved = h.engine.approve_loan(&h.admin, loan.id).await.unwrap();
    assert_eq!(approved.amount, dec!(12000));
    assert_eq!(approved.monthly_payment, Some(dec!(1030.04)));
}

#[tokio::test]
async fn test_respond_without_offer_is_invalid_state() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(5000))).await.unwrap();

    let err = h
        .engine
        .respond_to_offer(&customer, loan.id, OfferResponse::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));
}

#[tokio::test]
async fn test_fee_path_reaches_approval() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(12000))).await.unwrap();

    let fee = FeeRequest {
        amount: dec!(250),
        destination: Metadata::from([("bank".to_string(), "Credora Bank".to_string())]),
        description: "Processing fee".to_string(),
    };
    let loan = h.engine.request_processing_fee(&h.admin, loan.id, fee).await.unwrap();
    assert_eq!(loan.status, LoanStatus::FeePending);
    assert_eq!(loan.processing_fee.as_ref().unwrap().amount, dec!(250));

    // Approval is gated on the fee
    let err = h.engine.approve_loan(&h.admin, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));
    let err = h.engine.verify_fee_payment(&h.admin, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));

    let loan = h
        .engine
        .submit_fee_proof(&customer, loan.id, "https://files.example/fee.png")
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::FeePaid);
    assert!(loan.processing_fee.as_ref().unwrap().proof_submitted_at.is_some());

    let loan = h.engine.verify_fee_payment(&h.admin, loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Approved);
    assert_eq!(loan.monthly_payment, Some(dec!(1030.04)));
}

#[tokio::test]
async fn test_disbursement_credits_wallet_once() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(12000))).await.unwrap();
    h.engine.approve_loan(&h.admin, loan.id).await.unwrap();

    let (loan, tx) = h.engine.disburse_loan(&h.admin, loan.id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
    assert!(loan.disbursed_at.is_some());
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.metadata_value(metadata_keys::LOAN_ID), Some(loan.id.to_string().as_str()));
    assert_eq!(h.balance(customer.user_id).await, dec!(12000));

    let err = h.engine.disburse_loan(&h.admin, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));
    assert_eq!(h.balance(customer.user_id).await, dec!(12000));

    let trail = h
        .store
        .audit_records("loan", &loan.id.to_string())
        .await
        .unwrap();
    assert!(trail.iter().any(|r| r.action == "loan.disburse"));
}

#[tokio::test]
async fn test_disbursement_requires_approval() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(12000))).await.unwrap();

    let err = h.engine.disburse_loan(&h.admin, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));
    assert_eq!(h.balance(customer.user_id).await, dec!(0));
}

#[tokio::test]
async fn test_failed_commit_leaves_loan_approved() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(12000))).await.unwrap();
    h.engine.approve_loan(&h.admin, loan.id).await.unwrap();

    h.store.fail_next_commit();
    let err = h.engine.disburse_loan(&h.admin, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::Storage { .. }));

    let stored = h.engine.loan(&h.admin, loan.id).await.unwrap();
    assert_eq!(stored.status, LoanStatus::Approved);
    assert_eq!(h.balance(customer.user_id).await, dec!(0));

    // Retry succeeds
    h.engine.disburse_loan(&h.admin, loan.id).await.unwrap();
    assert_eq!(h.balance(customer.user_id).await, dec!(12000));
}

#[tokio::test]
async fn test_reject_requires_reason() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(3000))).await.unwrap();

    let err = h.engine.reject_loan(&h.admin, loan.id, "  ").await.unwrap_err();
    assert!(matches!(err, CredoraError::Validation { .. }));

    let loan = h.engine.reject_loan(&h.admin, loan.id, "Incomplete KYC").await.unwrap();
    assert_eq!(loan.status, LoanStatus::Rejected);
    assert_eq!(loan.rejection_reason.as_deref(), Some("Incomplete KYC"));

    let err = h.engine.approve_loan(&h.admin, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));
}

#[tokio::test]
async fn test_customer_cannot_decide_loans() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(3000))).await.unwrap();

    let err = h.engine.approve_loan(&customer, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::Unauthorized { .. }));
}

#[tokio::test]
async fn test_other_customers_cannot_see_loan() {
    let h = Harness::new();
    let owner = h.customer();
    let stranger = h.customer();
    let loan = h.engine.apply_for_loan(&owner, request(dec!(3000))).await.unwrap();

    let err = h.engine.loan(&stranger, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::NotFound { .. }));
    let err = h.engine.delete_loan(&stranger, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::NotFound { .. }));

    let err = h.engine.loans_for_user(&stranger, owner.user_id).await.unwrap_err();
    assert!(matches!(err, CredoraError::Unauthorized { .. }));
    assert_eq!(h.engine.loans_for_user(&h.admin, owner.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_refused_only_while_active() {
    let h = Harness::new();
    let customer = h.customer();

    let pending = h.engine.apply_for_loan(&customer, request(dec!(3000))).await.unwrap();
    h.engine.delete_loan(&customer, pending.id).await.unwrap();
    let err = h.engine.loan(&customer, pending.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::NotFound { .. }));

    let active = h.engine.apply_for_loan(&customer, request(dec!(3000))).await.unwrap();
    h.engine.approve_loan(&h.admin, active.id).await.unwrap();
    h.engine.disburse_loan(&h.admin, active.id).await.unwrap();
    let err = h.engine.delete_loan(&customer, active.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));
}

#[tokio::test]
async fn test_application_bounds_are_validated() {
    let h = Harness::new();
    let customer = h.customer();

    let err = h.engine.apply_for_loan(&customer, request(dec!(10))).await.unwrap_err();
    assert!(matches!(err, CredoraError::Validation { .. }));

    let mut long = request(dec!(5000));
    long.duration_months = 0;
    let err = h.engine.apply_for_loan(&customer, long).await.unwrap_err();
    assert!(matches!(err, CredoraError::Validation { .. }));
}

#[tokio::test]
async fn test_schedule_available_after_approval() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(12000))).await.unwrap();

    let err = h.engine.repayment_schedule(&customer, loan.id).await.unwrap_err();
    assert!(matches!(err, CredoraError::InvalidState { .. }));

    h.engine.approve_loan(&h.admin, loan.id).await.unwrap();
    let rows = h.engine.repayment_schedule(&customer, loan.id).await.unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0].payment, dec!(1030.04));
    assert_eq!(rows.last().unwrap().balance, dec!(0));
}

#[tokio::test]
async fn test_approval_notifies_applicant() {
    let h = Harness::new();
    let customer = h.customer();
    let loan = h.engine.apply_for_loan(&customer, request(dec!(3000))).await.unwrap();

    let received = h.next_notification().await;
    assert_eq!(received.user_id, customer.user_id);
    assert_eq!(received.title, "Loan application received");

    h.engine.approve_loan(&h.admin, loan.id).await.unwrap();
    let approved = h.next_notification().await;
    assert_eq!(approved.user_id, customer.user_id);
}
