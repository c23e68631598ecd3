use crate::core::errors::EngineError;
use crate::core::models::{FeeRate, OfferingType, SettlementStatus};
use crate::tests::{confirmed_participant, create_test_service, setup_offering, test_influencer};
use chrono::{Duration, Utc};
use uuid::Uuid;

#[tokio::test]
async fn test_settlement_arithmetic_with_default_fees() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 600_000).await;
    confirmed_participant(&engine, &offering, 400_000).await;

    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();

    // No fee config stored: 10% platform and 3.3% gateway safety defaults.
    assert_eq!(settlement.gross_amount, 1_000_000);
    assert_eq!(settlement.fee_amount, 100_000);
    assert_eq!(settlement.pg_fee_amount, 33_000);
    assert_eq!(settlement.net_amount, 867_000);
    assert_eq!(settlement.status, SettlementStatus::Pending);
    assert_eq!(settlement.bank.bank_name, "Kakao Bank");
}

#[tokio::test]
async fn test_tiny_gross_floors_fees_to_zero() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 7, 20).await;
    confirmed_participant(&engine, &offering, 7).await;

    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();

    assert_eq!(settlement.gross_amount, 7);
    assert_eq!(settlement.fee_amount, 0);
    assert_eq!(settlement.pg_fee_amount, 0);
    assert_eq!(settlement.net_amount, 7);
}

#[tokio::test]
async fn test_settlement_is_exactly_once() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 500_000).await;

    engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();
    let err = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyCalculated(_)));
}

#[tokio::test]
async fn test_concurrent_calculations_produce_one_settlement() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 500_000).await;

    let (a, b) = tokio::join!(
        engine.calculate_settlement(OfferingType::Course, offering.id),
        engine.calculate_settlement(OfferingType::Course, offering.id),
    );
    assert!(a.is_ok() != b.is_ok());
}

#[tokio::test]
async fn test_nothing_to_settle_without_confirmed_payments() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Party, 500_000, 20).await;
    // One application that never got confirmed.
    engine
        .apply_for_offering(offering.reference(), Uuid::new_v4())
        .await
        .unwrap();

    let err = engine
        .calculate_settlement(OfferingType::Party, offering.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NothingToSettle(_)));
}

#[tokio::test]
async fn test_cancelled_payment_excluded_from_gross() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 300_000).await;
    let cancelled = engine
        .apply_for_offering(offering.reference(), Uuid::new_v4())
        .await
        .unwrap();
    engine.confirm_participation(cancelled.id, 300_000).await.unwrap();
    engine.cancel_participation(cancelled.id).await.unwrap();

    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();
    assert_eq!(settlement.gross_amount, 300_000);
}

#[tokio::test]
async fn test_fee_config_applies_per_offering_type() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    engine
        .set_fee_config(
            FeeRate::from_basis_points(500),
            FeeRate::from_basis_points(800),
            FeeRate::from_basis_points(330),
        )
        .await
        .unwrap();

    let offering = setup_offering(&engine, OfferingType::Party, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 1_000_000).await;

    let settlement = engine
        .calculate_settlement(OfferingType::Party, offering.id)
        .await
        .unwrap();
    assert_eq!(settlement.fee_rate, FeeRate::from_basis_points(800));
    assert_eq!(settlement.fee_amount, 80_000);
    assert_eq!(settlement.pg_fee_amount, 33_000);
    assert_eq!(settlement.net_amount, 887_000);
}

#[tokio::test]
async fn test_influencer_override_beats_platform_rate() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    engine
        .set_fee_config(
            FeeRate::from_basis_points(1_000),
            FeeRate::from_basis_points(1_000),
            FeeRate::from_basis_points(330),
        )
        .await
        .unwrap();

    let mut influencer = test_influencer("Joon");
    influencer.course_fee_override = Some(FeeRate::from_percent(7));
    let influencer = engine.register_influencer(influencer).await.unwrap();
    let offering = engine
        .register_offering(crate::core::models::Offering {
            id: Uuid::new_v4(),
            offering_type: OfferingType::Course,
            influencer_id: influencer.id,
            title: "Busan food tour".to_string(),
            price: 1_000_000,
            max_participants: 5,
            current_participants: 0,
            start_date: Utc::now() + Duration::days(20),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    confirmed_participant(&engine, &offering, 1_000_000).await;

    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();
    assert_eq!(settlement.fee_rate, FeeRate::from_percent(7));
    assert_eq!(settlement.fee_amount, 70_000);
}

#[tokio::test]
async fn test_bank_snapshot_is_frozen_at_calculation() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let influencer = engine
        .register_influencer(test_influencer("Sora"))
        .await
        .unwrap();
    let offering = engine
        .register_offering(crate::core::models::Offering {
            id: Uuid::new_v4(),
            offering_type: OfferingType::Course,
            influencer_id: influencer.id,
            title: "Seoul night hike".to_string(),
            price: 100_000,
            max_participants: 5,
            current_participants: 0,
            start_date: Utc::now() + Duration::days(20),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    confirmed_participant(&engine, &offering, 100_000).await;

    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();

    // Influencer switches banks afterwards; the payout record keeps the
    // account it was calculated against.
    let mut updated = influencer.clone();
    updated.bank.bank_name = "Toss Bank".to_string();
    updated.bank.account_number = "1000-99-7654321".to_string();
    engine.register_influencer(updated).await.unwrap();

    let stored = engine.get_settlement(settlement.id).await.unwrap().unwrap();
    assert_eq!(stored.bank.bank_name, "Kakao Bank");
    assert_eq!(stored.bank.account_number, "3333-01-1234567");
}

#[tokio::test]
async fn test_lifecycle_happy_path() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 500_000).await;

    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();

    let processing = engine.process_settlement(settlement.id).await.unwrap();
    assert_eq!(processing.status, SettlementStatus::Processing);
    assert!(processing.processed_at.is_some());

    let completed = engine
        .complete_settlement(
            settlement.id,
            Some("https://receipts.example/abc".to_string()),
            Some("paid out 2026-08-30".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(completed.status, SettlementStatus::Completed);
    assert_eq!(
        completed.receipt_url.as_deref(),
        Some("https://receipts.example/abc")
    );
    assert!(completed.processed_at.unwrap() <= completed.completed_at.unwrap());
}

#[tokio::test]
async fn test_lifecycle_rejects_out_of_order_transitions() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 500_000).await;

    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();

    // Completing straight from pending is not allowed.
    let err = engine
        .complete_settlement(settlement.id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            current: SettlementStatus::Pending,
            ..
        }
    ));

    engine.process_settlement(settlement.id).await.unwrap();
    let err = engine.process_settlement(settlement.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            current: SettlementStatus::Processing,
            ..
        }
    ));
}

#[tokio::test]
async fn test_concurrent_process_calls_transition_once() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 500_000).await;
    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        engine.process_settlement(settlement.id),
        engine.process_settlement(settlement.id),
    );

    // The conditional write lets exactly one caller move pending forward.
    assert!(a.is_ok() != b.is_ok());
    let err = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(
        err,
        EngineError::InvalidState {
            current: SettlementStatus::Processing,
            ..
        }
    ));
    let stored = engine.get_settlement(settlement.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SettlementStatus::Processing);
}

#[tokio::test]
async fn test_completed_settlement_cannot_be_restamped() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    confirmed_participant(&engine, &offering, 500_000).await;
    let settlement = engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();
    engine.process_settlement(settlement.id).await.unwrap();
    engine
        .complete_settlement(
            settlement.id,
            Some("https://receipts.example/first".to_string()),
            None,
        )
        .await
        .unwrap();

    let err = engine
        .complete_settlement(
            settlement.id,
            Some("https://receipts.example/second".to_string()),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            current: SettlementStatus::Completed,
            ..
        }
    ));

    // The original completion record stays untouched.
    let stored = engine.get_settlement(settlement.id).await.unwrap().unwrap();
    assert_eq!(
        stored.receipt_url.as_deref(),
        Some("https://receipts.example/first")
    );
}

#[tokio::test]
async fn test_breakdown_lists_confirmed_contributions() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let p1 = confirmed_participant(&engine, &offering, 600_000).await;
    let p2 = confirmed_participant(&engine, &offering, 400_000).await;

    engine
        .calculate_settlement(OfferingType::Course, offering.id)
        .await
        .unwrap();
    let breakdown = engine
        .settlement_breakdown(OfferingType::Course, offering.id)
        .await
        .unwrap();

    assert_eq!(breakdown.contributions.len(), 2);
    let total: i64 = breakdown.contributions.iter().map(|c| c.paid_amount).sum();
    assert_eq!(total, breakdown.settlement.gross_amount);
    let ids: Vec<Uuid> = breakdown
        .contributions
        .iter()
        .map(|c| c.participant_id)
        .collect();
    assert!(ids.contains(&p1));
    assert!(ids.contains(&p2));
}
