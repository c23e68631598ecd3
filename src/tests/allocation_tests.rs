use crate::core::errors::EngineError;
use crate::core::models::{AllocationStatus, OfferingType};
use crate::tests::{confirmed_participant, create_test_service, setup_offering};
use uuid::Uuid;

#[tokio::test]
async fn test_split_collects_from_everyone_when_funded() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let mut participants = Vec::new();
    for _ in 0..3 {
        let pid = confirmed_participant(&engine, &offering, 500_000).await;
        engine
            .charge_wallet(offering.id, pid, 50_000, None)
            .await
            .unwrap();
        participants.push(pid);
    }

    let outcome = engine
        .create_allocation(
            offering.id,
            "boat rental".to_string(),
            90_000,
            participants.clone(),
            false,
        )
        .await
        .unwrap();

    assert_eq!(outcome.per_person_amount, 30_000);
    assert_eq!(outcome.allocation.status, AllocationStatus::Completed);
    assert!(outcome.allocation.completed_at.is_some());
    assert!(outcome.insufficient_balance_participants.is_empty());

    for pid in &participants {
        assert_eq!(engine.wallet_balance(offering.id, *pid).await.unwrap(), 20_000);
        let summary = engine.wallet_summary(offering.id, *pid).await.unwrap();
        let collection_tx = summary
            .transactions()
            .iter()
            .find(|t| t.allocation_id == Some(outcome.allocation.id))
            .unwrap();
        assert_eq!(collection_tx.amount, 30_000);
        assert_eq!(collection_tx.description, "boat rental");
    }
}

#[tokio::test]
async fn test_uneven_split_rounds_share_up() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let mut participants = Vec::new();
    for _ in 0..3 {
        let pid = confirmed_participant(&engine, &offering, 500_000).await;
        engine
            .charge_wallet(offering.id, pid, 40_000, None)
            .await
            .unwrap();
        participants.push(pid);
    }

    let outcome = engine
        .create_allocation(
            offering.id,
            "dinner".to_string(),
            100_000,
            participants,
            false,
        )
        .await
        .unwrap();

    // ceil(100000 / 3): everyone pays the same, the pool over-collects by 2.
    assert_eq!(outcome.per_person_amount, 33_334);
    assert_eq!(outcome.allocation.rounding_surplus(), 2);
    assert_eq!(outcome.allocation.status, AllocationStatus::Completed);
}

#[tokio::test]
async fn test_one_short_wallet_blocks_everyone() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let rich_a = confirmed_participant(&engine, &offering, 500_000).await;
    let rich_b = confirmed_participant(&engine, &offering, 500_000).await;
    let poor = confirmed_participant(&engine, &offering, 500_000).await;
    engine.charge_wallet(offering.id, rich_a, 50_000, None).await.unwrap();
    engine.charge_wallet(offering.id, rich_b, 50_000, None).await.unwrap();
    engine.charge_wallet(offering.id, poor, 33_333, None).await.unwrap();

    let outcome = engine
        .create_allocation(
            offering.id,
            "dinner".to_string(),
            100_000,
            vec![rich_a, rich_b, poor],
            false,
        )
        .await
        .unwrap();

    assert_eq!(outcome.allocation.status, AllocationStatus::Pending);
    assert_eq!(outcome.insufficient_balance_participants, vec![poor]);

    // All-or-nothing: the funded wallets were not touched either.
    assert_eq!(engine.wallet_balance(offering.id, rich_a).await.unwrap(), 50_000);
    assert_eq!(engine.wallet_balance(offering.id, rich_b).await.unwrap(), 50_000);
    assert_eq!(engine.wallet_balance(offering.id, poor).await.unwrap(), 33_333);
}

#[tokio::test]
async fn test_retry_after_topup_completes_with_original_share() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let p1 = confirmed_participant(&engine, &offering, 500_000).await;
    let p2 = confirmed_participant(&engine, &offering, 500_000).await;
    engine.charge_wallet(offering.id, p1, 60_000, None).await.unwrap();
    engine.charge_wallet(offering.id, p2, 10_000, None).await.unwrap();

    let pending = engine
        .create_allocation(offering.id, "villa".to_string(), 100_000, vec![p1, p2], false)
        .await
        .unwrap();
    assert_eq!(pending.allocation.status, AllocationStatus::Pending);

    // Status re-reads the live balances.
    let status = engine.allocation_status(pending.allocation.id).await.unwrap();
    assert_eq!(status.insufficient_balance_participants, vec![p2]);

    engine.charge_wallet(offering.id, p2, 40_000, None).await.unwrap();
    let retried = engine.retry_allocation(pending.allocation.id).await.unwrap();

    assert_eq!(retried.allocation.status, AllocationStatus::Completed);
    assert_eq!(retried.per_person_amount, 50_000);
    assert_eq!(engine.wallet_balance(offering.id, p1).await.unwrap(), 10_000);
    assert_eq!(engine.wallet_balance(offering.id, p2).await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_retries_collect_once() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let p1 = confirmed_participant(&engine, &offering, 500_000).await;
    let p2 = confirmed_participant(&engine, &offering, 500_000).await;
    engine.charge_wallet(offering.id, p1, 100_000, None).await.unwrap();
    engine.charge_wallet(offering.id, p2, 10_000, None).await.unwrap();

    let pending = engine
        .create_allocation(offering.id, "villa".to_string(), 100_000, vec![p1, p2], false)
        .await
        .unwrap();
    assert_eq!(pending.allocation.status, AllocationStatus::Pending);
    engine.charge_wallet(offering.id, p2, 40_000, None).await.unwrap();

    let (a, b) = tokio::join!(
        engine.retry_allocation(pending.allocation.id),
        engine.retry_allocation(pending.allocation.id),
    );

    // Exactly one pass collects; the other loses the pending guard.
    assert!(a.is_ok() != b.is_ok());
    let err = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(err, EngineError::AllocationAlreadyCompleted(_)));

    // Each wallet was deducted the 50_000 share exactly once.
    assert_eq!(engine.wallet_balance(offering.id, p1).await.unwrap(), 50_000);
    assert_eq!(engine.wallet_balance(offering.id, p2).await.unwrap(), 0);
    assert_eq!(
        engine.verify_wallet_consistency(offering.id, p1).await.unwrap(),
        50_000
    );
    let summary = engine.wallet_summary(offering.id, p1).await.unwrap();
    let collections = summary
        .transactions()
        .iter()
        .filter(|t| t.allocation_id == Some(pending.allocation.id))
        .count();
    assert_eq!(collections, 1);
}

#[tokio::test]
async fn test_retry_of_completed_allocation_is_rejected() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let pid = confirmed_participant(&engine, &offering, 500_000).await;
    engine.charge_wallet(offering.id, pid, 30_000, None).await.unwrap();

    let outcome = engine
        .create_allocation(offering.id, "tickets".to_string(), 20_000, vec![pid], false)
        .await
        .unwrap();
    assert_eq!(outcome.allocation.status, AllocationStatus::Completed);

    let err = engine.retry_allocation(outcome.allocation.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AllocationAlreadyCompleted(_)));
    // No double collection happened.
    assert_eq!(engine.wallet_balance(offering.id, pid).await.unwrap(), 10_000);
}

#[tokio::test]
async fn test_allocation_participant_validation() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let confirmed = confirmed_participant(&engine, &offering, 500_000).await;

    let err = engine
        .create_allocation(offering.id, "x".to_string(), 10_000, vec![], false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyParticipants));

    let err = engine
        .create_allocation(
            offering.id,
            "x".to_string(),
            10_000,
            vec![confirmed, confirmed],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateParticipant(_)));

    let stranger = Uuid::new_v4();
    let err = engine
        .create_allocation(
            offering.id,
            "x".to_string(),
            10_000,
            vec![confirmed, stranger],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotConfirmedParticipant(_)));
}

#[tokio::test]
async fn test_cancelled_participant_cannot_join_allocation() {
    let _ = env_logger::try_init();
    let engine = create_test_service();
    let offering = setup_offering(&engine, OfferingType::Course, 500_000, 20).await;
    let pid = Uuid::new_v4();
    let participation = engine
        .apply_for_offering(offering.reference(), pid)
        .await
        .unwrap();
    engine.confirm_participation(participation.id, 500_000).await.unwrap();
    engine.cancel_participation(participation.id).await.unwrap();

    let err = engine
        .create_allocation(offering.id, "x".to_string(), 10_000, vec![pid], false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotConfirmedParticipant(_)));
}
