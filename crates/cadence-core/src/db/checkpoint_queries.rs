//! Append-only checkpoint log.

use rusqlite::{params, OptionalExtension, Transaction};

use super::utils::{json_column, timestamp_column};
use crate::{
    error::{PersistenceResultExt, Result},
    models::{Checkpoint, CheckpointId, Plan, PlanId},
};

const NEXT_SEQUENCE_SQL: &str =
    "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM checkpoints WHERE plan_id = ?1";
const INSERT_CHECKPOINT_SQL: &str = "INSERT INTO checkpoints (plan_id, sequence_number, snapshot, created_at) VALUES (?1, ?2, ?3, ?4)";
const SELECT_SEQUENCES_SQL: &str =
    "SELECT sequence_number FROM checkpoints WHERE plan_id = ?1 ORDER BY sequence_number";
const SELECT_CHECKPOINT_SQL: &str = "SELECT plan_id, sequence_number, snapshot, created_at FROM checkpoints WHERE plan_id = ?1 AND sequence_number = ?2";

impl super::Database {
    /// Appends a snapshot of `plan` with the next sequence number.
    pub(super) fn append_checkpoint(tx: &Transaction, plan: &Plan) -> Result<CheckpointId> {
        let next: i64 = tx
            .query_row(NEXT_SEQUENCE_SQL, params![plan.id.as_str()], |row| row.get(0))
            .persist_context("Failed to compute next checkpoint sequence")?;

        let checkpoint = Checkpoint::capture(plan, next as CheckpointId);
        tx.execute(
            INSERT_CHECKPOINT_SQL,
            params![
                plan.id.as_str(),
                next,
                serde_json::to_string(&checkpoint.snapshot)?,
                checkpoint.created_at.to_string(),
            ],
        )
        .persist_context("Failed to insert checkpoint")?;

        Ok(checkpoint.sequence_number)
    }

    /// Sequence numbers of every checkpoint of a plan, ascending.
    pub fn list_checkpoints(&self, plan_id: &PlanId) -> Result<Vec<CheckpointId>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_SEQUENCES_SQL)
            .persist_context("Failed to prepare query")?;

        let sequences = stmt
            .query_map(params![plan_id.as_str()], |row| {
                row.get::<_, i64>(0).map(|v| v as CheckpointId)
            })
            .persist_context("Failed to query checkpoints")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist_context("Failed to read checkpoints")?;

        Ok(sequences)
    }

    /// Retrieves one checkpoint.
    pub fn get_checkpoint(
        &self,
        plan_id: &PlanId,
        sequence: CheckpointId,
    ) -> Result<Option<Checkpoint>> {
        self.connection
            .query_row(
                SELECT_CHECKPOINT_SQL,
                params![plan_id.as_str(), sequence as i64],
                |row| {
                    Ok(Checkpoint {
                        plan_id: PlanId::new(row.get::<_, String>(0)?),
                        sequence_number: row.get::<_, i64>(1)? as CheckpointId,
                        snapshot: json_column(row, 2)?,
                        created_at: timestamp_column(row, 3)?,
                    })
                },
            )
            .optional()
            .persist_context("Failed to query checkpoint")
    }
}
