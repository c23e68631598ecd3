mod allocation_tests;
mod settlement_tests;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::core::models::{BankAccount, Influencer, Offering, OfferingType};
use crate::core::services::TripsplitService;
use crate::infrastructure::cache::in_memory::InMemoryCache;
use crate::infrastructure::logging::in_memory::InMemoryLogging;
use crate::infrastructure::storage::in_memory::InMemoryStorage;

pub type TestEngine = TripsplitService<InMemoryLogging, InMemoryStorage, InMemoryCache>;

pub fn create_test_service() -> TestEngine {
    let storage = InMemoryStorage::new();
    let logging = InMemoryLogging::new();
    let cache = InMemoryCache::new();
    TripsplitService::new(storage, logging, cache)
}

pub fn test_influencer(name: &str) -> Influencer {
    let now = Utc::now();
    Influencer {
        id: Uuid::new_v4(),
        name: name.to_string(),
        bank: BankAccount {
            bank_name: "Kakao Bank".to_string(),
            account_number: "3333-01-1234567".to_string(),
            account_holder: name.to_string(),
        },
        course_fee_override: None,
        party_fee_override: None,
        created_at: now,
        updated_at: now,
    }
}

/// Registers a fresh influencer plus one offering starting the given number
/// of days from now.
pub async fn setup_offering(
    engine: &TestEngine,
    offering_type: OfferingType,
    price: i64,
    days_until_start: i64,
) -> Offering {
    let influencer = engine
        .register_influencer(test_influencer("Mina"))
        .await
        .unwrap();
    let offering = Offering {
        id: Uuid::new_v4(),
        offering_type,
        influencer_id: influencer.id,
        title: "Jeju surf weekend".to_string(),
        price,
        max_participants: 10,
        current_participants: 0,
        start_date: Utc::now() + Duration::days(days_until_start),
        created_at: Utc::now(),
    };
    engine.register_offering(offering).await.unwrap()
}

/// Applies and confirms a new participant with the given captured payment.
pub async fn confirmed_participant(
    engine: &TestEngine,
    offering: &Offering,
    paid_amount: i64,
) -> Uuid {
    let participant_id = Uuid::new_v4();
    let participation = engine
        .apply_for_offering(offering.reference(), participant_id)
        .await
        .unwrap();
    engine
        .confirm_participation(participation.id, paid_amount)
        .await
        .unwrap();
    participant_id
}
