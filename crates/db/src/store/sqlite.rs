use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use embudo_core::chrono::{DateTime, Utc};
use embudo_core::domain::conversation::{ConversationState, ExperienceLevel, FunnelStage};

use super::{ConversationStore, StoreError};
use crate::DbPool;

pub struct SqliteConversationStore {
    pool: DbPool,
}

impl SqliteConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const STATE_COLUMNS: &str = "identity,
    display_name,
    country,
    experience,
    stage,
    sub_step,
    final_price,
    awaiting_proof,
    proof_received,
    proof_payload,
    payment_confirmed,
    product_delivered,
    created_at,
    updated_at,
    last_message_at,
    message_count";

#[async_trait::async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn find(&self, identity: &str) -> Result<Option<ConversationState>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STATE_COLUMNS} FROM conversation_state WHERE identity = ?"
        ))
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.map(state_from_row).transpose()
    }

    async fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let proof_payload = state
            .proof_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| StoreError::Decode(format!("proof payload not encodable: {error}")))?;

        sqlx::query(&format!(
            "INSERT INTO conversation_state ({STATE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(identity) DO UPDATE SET
                display_name = excluded.display_name,
                country = excluded.country,
                experience = excluded.experience,
                stage = excluded.stage,
                sub_step = excluded.sub_step,
                final_price = excluded.final_price,
                awaiting_proof = excluded.awaiting_proof,
                proof_received = excluded.proof_received,
                proof_payload = excluded.proof_payload,
                payment_confirmed = excluded.payment_confirmed,
                product_delivered = excluded.product_delivered,
                updated_at = excluded.updated_at,
                last_message_at = excluded.last_message_at,
                message_count = excluded.message_count"
        ))
        .bind(&state.identity)
        .bind(&state.display_name)
        .bind(&state.country)
        .bind(state.experience.map(|level| level.as_str()))
        .bind(state.stage.as_str())
        .bind(&state.sub_step)
        .bind(state.final_price.map(|price| price.to_string()))
        .bind(state.awaiting_proof)
        .bind(state.proof_received)
        .bind(proof_payload)
        .bind(state.payment_confirmed)
        .bind(state.product_delivered)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .bind(state.last_message_at.map(|at| at.to_rfc3339()))
        .bind(state.message_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM conversation_state WHERE identity = ?")
            .bind(identity)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<ConversationState>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STATE_COLUMNS} FROM conversation_state ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(state_from_row).collect()
    }
}

fn state_from_row(row: SqliteRow) -> Result<ConversationState, StoreError> {
    let stage_raw = row.try_get::<String, _>("stage")?;
    let stage = FunnelStage::parse(&stage_raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown funnel stage `{stage_raw}`")))?;

    let experience = row
        .try_get::<Option<String>, _>("experience")?
        .map(|value| {
            ExperienceLevel::parse(&value)
                .ok_or_else(|| StoreError::Decode(format!("unknown experience level `{value}`")))
        })
        .transpose()?;

    let final_price = row
        .try_get::<Option<String>, _>("final_price")?
        .map(|value| {
            Decimal::from_str(&value).map_err(|error| {
                StoreError::Decode(format!("invalid final_price `{value}` ({error})"))
            })
        })
        .transpose()?;

    let proof_payload = row
        .try_get::<Option<String>, _>("proof_payload")?
        .map(|value| {
            serde_json::from_str(&value).map_err(|error| {
                StoreError::Decode(format!("invalid proof_payload JSON ({error})"))
            })
        })
        .transpose()?;

    Ok(ConversationState {
        identity: row.try_get("identity")?,
        display_name: row.try_get("display_name")?,
        country: row.try_get("country")?,
        experience,
        stage,
        sub_step: row.try_get("sub_step")?,
        final_price,
        awaiting_proof: row.try_get("awaiting_proof")?,
        proof_received: row.try_get("proof_received")?,
        proof_payload,
        payment_confirmed: row.try_get("payment_confirmed")?,
        product_delivered: row.try_get("product_delivered")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        last_message_at: parse_optional_timestamp(
            "last_message_at",
            row.try_get("last_message_at")?,
        )?,
        message_count: row.try_get("message_count")?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| StoreError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})")),
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use embudo_core::domain::conversation::{ConversationState, ExperienceLevel, FunnelStage};

    use super::SqliteConversationStore;
    use crate::store::ConversationStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqliteConversationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqliteConversationStore::new(pool)
    }

    fn full_state() -> ConversationState {
        let mut state = ConversationState::new("593999000001@s.whatsapp.net");
        state.display_name = Some("Carlos".to_string());
        state.country = Some("Ecuador".to_string());
        state.experience = Some(ExperienceLevel::Beginner);
        state.enter_stage(FunnelStage::Verifier);
        state.final_price = Some(Decimal::new(699, 2));
        state.awaiting_proof = true;
        state.store_proof(json!({"mimetype": "image/jpeg", "caption": "pago"}));
        state.note_message();
        state
    }

    #[tokio::test]
    async fn save_then_find_round_trips_every_field() {
        let store = store().await;
        let state = full_state();

        store.save(&state).await.expect("save");
        let loaded = store
            .find(&state.identity)
            .await
            .expect("find")
            .expect("record should exist");

        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn find_returns_none_for_unknown_identity() {
        let store = store().await;
        let loaded = store.find("nobody@s.whatsapp.net").await.expect("find");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = store().await;
        let mut state = full_state();
        store.save(&state).await.expect("first save");

        state.mark_confirmed();
        state.enter_stage(FunnelStage::Upsell);
        store.save(&state).await.expect("second save");

        let loaded = store.find(&state.identity).await.expect("find").expect("record");
        assert_eq!(loaded.stage, FunnelStage::Upsell);
        assert!(loaded.payment_confirmed);
        assert!(loaded.product_delivered);
        assert!(!loaded.awaiting_proof);

        let all = store.list().await.expect("list");
        assert_eq!(all.len(), 1, "upsert must not duplicate the row");
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_existed() {
        let store = store().await;
        let state = full_state();
        store.save(&state).await.expect("save");

        assert!(store.delete(&state.identity).await.expect("delete existing"));
        assert!(!store.delete(&state.identity).await.expect("delete again"));
        assert!(store.find(&state.identity).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn unknown_stage_in_storage_is_a_decode_error() {
        let store = store().await;
        let state = full_state();
        store.save(&state).await.expect("save");

        sqlx::query("UPDATE conversation_state SET stage = 'abducted' WHERE identity = ?")
            .bind(&state.identity)
            .execute(&store.pool)
            .await
            .expect("corrupt stage");

        let result = store.find(&state.identity).await;
        assert!(matches!(result, Err(crate::StoreError::Decode(_))));
    }
}
