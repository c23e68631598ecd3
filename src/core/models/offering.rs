use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OfferingType {
    Course,
    Party,
}

impl std::fmt::Display for OfferingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OfferingType::Course => "course",
            OfferingType::Party => "party",
        };
        write!(f, "{}", s)
    }
}

/// Reference to an offering as (type, id). Settlements are unique per ref.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OfferingRef {
    pub offering_type: OfferingType,
    pub offering_id: Uuid,
}

impl OfferingRef {
    pub fn new(offering_type: OfferingType, offering_id: Uuid) -> Self {
        OfferingRef {
            offering_type,
            offering_id,
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.offering_type, self.offering_id)
    }
}

impl std::fmt::Display for OfferingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Catalog entity owned by the surrounding application; the engine only
/// reads it (influencer, type, start date) and never mutates it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Offering {
    pub id: Uuid,
    pub offering_type: OfferingType,
    pub influencer_id: Uuid,
    pub title: String,
    pub price: i64,
    pub max_participants: u32,
    pub current_participants: u32,
    pub start_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Offering {
    pub fn reference(&self) -> OfferingRef {
        OfferingRef::new(self.offering_type, self.id)
    }
}
