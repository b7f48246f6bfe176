//! Command arguments and their execution against the orchestrator.
//!
//! Every invocation is a separate process: plans are loaded from the store on
//! demand, driven to their next resting point and rendered as markdown.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use cadence_core::{
    display::{CheckpointHistory, ControlResult, PlanReports, RollbackResult, SkipResult},
    models::{CheckpointId, Plan, PlanId, PlanReport, PlanStatus, StepId},
    CheckpointStore, PlanOrchestrator,
};
use clap::Args;

use crate::renderer::TerminalRenderer;

/// A plan definition file.
#[derive(Args)]
pub struct PlanFileArgs {
    /// JSON file with the plan goal, steps and failure policy
    #[arg(help = "Path to a JSON plan definition")]
    pub file: PathBuf,
}

/// A plan selected by id.
#[derive(Args)]
pub struct PlanIdArgs {
    #[arg(help = "Identifier of the plan")]
    pub plan_id: String,
}

/// Listing checkpoints, optionally with one snapshot in full.
#[derive(Args)]
pub struct CheckpointArgs {
    #[arg(help = "Identifier of the plan")]
    pub plan_id: String,
    /// Print the snapshot held by this checkpoint instead of the list
    #[arg(long)]
    pub show: Option<CheckpointId>,
}

/// Restoring a checkpoint.
#[derive(Args)]
pub struct RollbackArgs {
    #[arg(help = "Identifier of the plan")]
    pub plan_id: String,
    #[arg(help = "Checkpoint number to restore (see `cadence checkpoints`)")]
    pub checkpoint: CheckpointId,
    /// Continue running from the restored state
    #[arg(long)]
    pub resume: bool,
}

/// Skipping a step.
#[derive(Args)]
pub struct SkipArgs {
    #[arg(help = "Identifier of the plan")]
    pub plan_id: String,
    #[arg(help = "Identifier of the step to skip")]
    pub step_id: String,
}

/// Executes commands and renders their results.
pub struct Cli {
    orchestrator: PlanOrchestrator,
    renderer: TerminalRenderer,
}

impl Cli {
    pub fn new(orchestrator: PlanOrchestrator, renderer: TerminalRenderer) -> Self {
        Self {
            orchestrator,
            renderer,
        }
    }

    pub async fn run(&self, args: PlanFileArgs) -> Result<()> {
        let plan = read_plan(&args.file)?;
        let plan_id = self
            .orchestrator
            .start(plan)
            .await
            .context("Failed to start plan")?;
        let report = self.drive(&plan_id).await?;
        self.finish(&report)
    }

    pub async fn submit(&self, args: PlanFileArgs) -> Result<()> {
        let plan = read_plan(&args.file)?;
        let plan_id = self
            .orchestrator
            .submit(plan)
            .await
            .context("Failed to submit plan")?;
        let plan = self.orchestrator.plan(&plan_id).await?;
        self.renderer.render(&plan.to_string())
    }

    pub async fn show(&self, args: PlanIdArgs) -> Result<()> {
        let plan_id = PlanId::from(args.plan_id);
        let plan = self
            .orchestrator
            .recover(&plan_id)
            .await
            .with_context(|| format!("Failed to load plan {plan_id}"))?;
        self.renderer.render(&plan.to_string())
    }

    pub async fn list(&self) -> Result<()> {
        let store = self.orchestrator.store();
        let mut reports = Vec::new();
        for plan_id in store.plan_ids().await.context("Failed to list plans")? {
            if let Some(plan) = store.load(&plan_id).await? {
                reports.push(PlanReport::from(&plan));
            }
        }
        reports.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.renderer.render(&PlanReports(reports).to_string())
    }

    pub async fn resume(&self, args: PlanIdArgs) -> Result<()> {
        let plan_id = PlanId::from(args.plan_id);
        self.orchestrator
            .resume(&plan_id)
            .await
            .with_context(|| format!("Failed to resume plan {plan_id}"))?;
        let report = self.drive(&plan_id).await?;
        self.finish(&report)
    }

    pub async fn cancel(&self, args: PlanIdArgs) -> Result<()> {
        let plan_id = PlanId::from(args.plan_id);
        self.orchestrator.recover(&plan_id).await?;
        self.orchestrator
            .cancel(&plan_id)
            .await
            .with_context(|| format!("Failed to cancel plan {plan_id}"))?;
        self.renderer
            .render(&ControlResult::new(plan_id, "cancelled").to_string())
    }

    pub async fn skip(&self, args: SkipArgs) -> Result<()> {
        let plan_id = PlanId::from(args.plan_id);
        self.orchestrator.recover(&plan_id).await?;
        let skipped = self
            .orchestrator
            .skip_step(&plan_id, &StepId::from(args.step_id))
            .await
            .context("Failed to skip step")?;
        self.renderer
            .render(&SkipResult { plan_id, skipped }.to_string())
    }

    pub async fn checkpoints(&self, args: CheckpointArgs) -> Result<()> {
        let plan_id = PlanId::from(args.plan_id);
        let store = self.orchestrator.store();

        if let Some(sequence) = args.show {
            let plan = store
                .restore(&plan_id, sequence)
                .await
                .with_context(|| format!("Failed to read checkpoint {sequence}"))?;
            return self.renderer.render(&plan.to_string());
        }

        let ids = self.orchestrator.checkpoints(&plan_id).await?;
        if ids.is_empty() {
            bail!("No checkpoints stored for plan {plan_id}");
        }
        let mut history = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(checkpoint) = store.checkpoint(&plan_id, id).await? {
                history.push(checkpoint);
            }
        }
        self.renderer
            .render(&CheckpointHistory(history).to_string())
    }

    pub async fn rollback(&self, args: RollbackArgs) -> Result<()> {
        let plan_id = PlanId::from(args.plan_id);
        self.orchestrator
            .rollback_to_checkpoint(&plan_id, args.checkpoint)
            .await
            .with_context(|| {
                format!("Failed to roll back plan {plan_id} to checkpoint {}", args.checkpoint)
            })?;

        if !args.resume {
            let plan = self.orchestrator.plan(&plan_id).await?;
            let result = RollbackResult {
                checkpoint: args.checkpoint,
                plan,
            };
            return self.renderer.render(&result.to_string());
        }

        let plan = self.orchestrator.plan(&plan_id).await?;
        if plan.status == PlanStatus::Pending {
            self.orchestrator.run(&plan_id).await?;
        } else {
            self.orchestrator.resume(&plan_id).await?;
        }
        let report = self.drive(&plan_id).await?;
        self.finish(&report)
    }

    pub fn capabilities(&self, capabilities: &[String]) -> Result<()> {
        let mut output = String::from("# Capabilities\n\n");
        for capability in capabilities {
            output.push_str(&format!("- {capability}\n"));
        }
        self.renderer.render(&output)
    }

    /// Waits for the plan to stop; Ctrl-C pauses it so it can be resumed.
    async fn drive(&self, plan_id: &PlanId) -> Result<PlanReport> {
        tokio::select! {
            report = self.orchestrator.wait(plan_id) => {
                return report.with_context(|| format!("Plan {plan_id} stopped"));
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                log::info!("Interrupted; pausing plan {plan_id}");
                eprintln!("Pausing plan {plan_id} after the running steps finish...");
                if let Err(e) = self.orchestrator.pause(plan_id).await {
                    log::info!("Plan {plan_id} was not paused: {e}");
                }
            }
        }
        self.orchestrator
            .wait(plan_id)
            .await
            .with_context(|| format!("Plan {plan_id} stopped"))
    }

    /// Renders the report; an unsuccessful plan makes the process fail.
    fn finish(&self, report: &PlanReport) -> Result<()> {
        self.renderer.render(&report.to_string())?;
        match report.status {
            PlanStatus::Completed | PlanStatus::Paused => Ok(()),
            status => bail!("Plan {} is {status}", report.plan_id),
        }
    }
}

fn read_plan(path: &Path) -> Result<Plan> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid plan definition in {}", path.display()))
}
