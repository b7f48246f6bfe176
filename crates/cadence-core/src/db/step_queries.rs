//! Step and step-result persistence.

use rusqlite::{params, Row, Transaction};

use super::utils::{json_column, optional_u64, parse_column, timestamp_column};
use crate::{
    error::{PersistenceResultExt, Result},
    models::{Capability, Plan, PlanId, Step, StepId, StepResult},
};

const DELETE_RESULTS_SQL: &str = "DELETE FROM step_results WHERE plan_id = ?1";
const DELETE_STEPS_SQL: &str = "DELETE FROM steps WHERE plan_id = ?1";
const INSERT_STEP_SQL: &str = "INSERT INTO steps (plan_id, id, position, sequence_index, description, required_capability, dependencies, status, retry_count, max_retries, timeout_ms, input, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";
const INSERT_RESULT_SQL: &str = "INSERT INTO step_results (plan_id, step_id, output, confidence_score, quality_score, sources, execution_time_ms, status, error) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
const SELECT_STEPS_BY_PLAN_SQL: &str = "SELECT s.id, s.sequence_index, s.description, s.required_capability, s.dependencies, s.status, s.retry_count, s.max_retries, s.timeout_ms, s.input, s.updated_at, \
     r.output, r.confidence_score, r.quality_score, r.sources, r.execution_time_ms, r.status, r.error \
     FROM steps s LEFT JOIN step_results r ON r.plan_id = s.plan_id AND r.step_id = s.id \
     WHERE s.plan_id = ?1 ORDER BY s.position";

impl super::Database {
    /// Helper function to construct a Step (and its result) from a joined row
    fn build_step_from_row(row: &Row) -> rusqlite::Result<Step> {
        let id = StepId::new(row.get::<_, String>(0)?);

        let result = match row.get::<_, Option<String>>(16)? {
            Some(_) => Some(StepResult {
                step_id: id.clone(),
                output: json_column(row, 11)?,
                confidence_score: row.get(12)?,
                quality_score: row.get(13)?,
                sources: json_column(row, 14)?,
                execution_time_ms: optional_u64(row, 15)?.unwrap_or_default(),
                status: parse_column(row, 16)?,
                error: row.get(17)?,
            }),
            None => None,
        };

        Ok(Step {
            id,
            sequence_index: row.get::<_, i64>(1)? as u32,
            description: row.get(2)?,
            required_capability: Capability::new(row.get::<_, String>(3)?),
            dependencies: json_column(row, 4)?,
            status: parse_column(row, 5)?,
            retry_count: row.get::<_, i64>(6)? as u32,
            max_retries: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
            timeout_ms: optional_u64(row, 8)?,
            input: json_column(row, 9)?,
            result,
            updated_at: timestamp_column(row, 10)?,
        })
    }

    /// Replaces every step and result row of `plan` inside `tx`.
    pub(super) fn replace_steps(tx: &Transaction, plan: &Plan) -> Result<()> {
        let plan_id = plan.id.as_str();

        tx.execute(DELETE_RESULTS_SQL, params![plan_id])
            .persist_context("Failed to clear step results")?;
        tx.execute(DELETE_STEPS_SQL, params![plan_id])
            .persist_context("Failed to clear steps")?;

        let mut insert_step = tx
            .prepare(INSERT_STEP_SQL)
            .persist_context("Failed to prepare step insert")?;
        let mut insert_result = tx
            .prepare(INSERT_RESULT_SQL)
            .persist_context("Failed to prepare result insert")?;

        for (position, step) in plan.steps.iter().enumerate() {
            insert_step
                .execute(params![
                    plan_id,
                    step.id.as_str(),
                    position as i64,
                    step.sequence_index as i64,
                    &step.description,
                    step.required_capability.as_str(),
                    serde_json::to_string(&step.dependencies)?,
                    step.status.as_str(),
                    step.retry_count as i64,
                    step.max_retries.map(i64::from),
                    step.timeout_ms.map(|v| v as i64),
                    serde_json::to_string(&step.input)?,
                    step.updated_at.to_string(),
                ])
                .persist_context("Failed to insert step")?;

            if let Some(result) = &step.result {
                insert_result
                    .execute(params![
                        plan_id,
                        step.id.as_str(),
                        serde_json::to_string(&result.output)?,
                        result.confidence_score,
                        result.quality_score,
                        serde_json::to_string(&result.sources)?,
                        result.execution_time_ms as i64,
                        result.status.as_str(),
                        result.error.as_deref(),
                    ])
                    .persist_context("Failed to insert step result")?;
            }
        }

        Ok(())
    }

    /// Retrieves all steps of a plan in insertion order.
    pub fn get_steps(&self, plan_id: &PlanId) -> Result<Vec<Step>> {
        let mut stmt = self
            .connection
            .prepare(SELECT_STEPS_BY_PLAN_SQL)
            .persist_context("Failed to prepare query")?;

        let steps = stmt
            .query_map(params![plan_id.as_str()], Self::build_step_from_row)
            .persist_context("Failed to query steps")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .persist_context("Failed to read steps")?;

        Ok(steps)
    }
}
