//! Plan persistence and queries.

use rusqlite::{params, OptionalExtension, TransactionBehavior};

use super::utils::{parse_column, timestamp_column};
use crate::{
    error::{PersistenceResultExt, Result},
    models::{CheckpointId, Plan, PlanId},
};

const UPSERT_PLAN_SQL: &str = "INSERT INTO plans (id, goal, status, failure_policy, progress_percentage, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
     ON CONFLICT(id) DO UPDATE SET goal = excluded.goal, status = excluded.status, failure_policy = excluded.failure_policy, progress_percentage = excluded.progress_percentage, updated_at = excluded.updated_at";
const SELECT_PLAN_SQL: &str =
    "SELECT id, goal, status, failure_policy, created_at, updated_at FROM plans WHERE id = ?1";
const SELECT_PLAN_IDS_SQL: &str = "SELECT id FROM plans ORDER BY created_at, id";

impl super::Database {
    /// Persists the full state of `plan` and appends a checkpoint.
    ///
    /// The plan row is upserted, its step and result rows are replaced, and a
    /// snapshot is appended, all inside one immediate transaction. Returns the
    /// new checkpoint's sequence number.
    pub fn save_plan(&mut self, plan: &Plan) -> Result<CheckpointId> {
        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .persist_context("Failed to begin transaction")?;

        tx.execute(
            UPSERT_PLAN_SQL,
            params![
                plan.id.as_str(),
                &plan.goal,
                plan.status.as_str(),
                plan.failure_policy.as_str(),
                plan.progress_percentage(),
                plan.created_at.to_string(),
                plan.updated_at.to_string(),
            ],
        )
        .persist_context("Failed to upsert plan")?;

        Self::replace_steps(&tx, plan)?;
        let sequence = Self::append_checkpoint(&tx, plan)?;

        tx.commit().persist_context("Failed to commit transaction")?;
        Ok(sequence)
    }

    /// Retrieves a plan with its steps and their latest results.
    pub fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_PLAN_SQL)
            .persist_context("Failed to prepare query")?;

        let mut plan = stmt
            .query_row(params![id.as_str()], |row| {
                Ok(Plan {
                    id: PlanId::new(row.get::<_, String>(0)?),
                    goal: row.get(1)?,
                    status: parse_column(row, 2)?,
                    failure_policy: parse_column(row, 3)?,
                    created_at: timestamp_column(row, 4)?,
                    updated_at: timestamp_column(row, 5)?,
                    steps: Vec::new(),
                })
            })
            .optional()
            .persist_context("Failed to query plan")?;

        // Eagerly load steps if plan exists
        if let Some(ref mut plan) = plan {
            plan.steps = self.get_steps(&plan.id)?;
        }

        Ok(plan)
    }

    /// Identifiers of every stored plan, oldest first.
    pub fn list_plan_ids(&self) -> Result<Vec<PlanId>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_PLAN_IDS_SQL)
            .persist_context("Failed to prepare query")?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0).map(PlanId::new))
            .persist_context("Failed to query plan ids")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist_context("Failed to read plan ids")?;

        Ok(ids)
    }
}
