use uuid::Uuid;

pub fn wallet_summary_key(offering_id: Uuid, participant_id: Uuid) -> String {
    format!("wallet_summary:{}:{}", offering_id, participant_id)
}
