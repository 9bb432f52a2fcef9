use anyhow::{Context, Result, bail};
use crucible_application::{BuildRoleAgent, CommandRoleAgent, Pipeline, RunRoleAgent};
use crucible_build::{CompilerService, DotnetBuildTool};
use crucible_core::agent::RoleAgent;
use crucible_core::audit::AuditCounters;
use crucible_core::conversation::Role;
use crucible_core::workflow::WorkflowOutcome;
use crucible_execution::{ExecutionRunner, HostBinaryLauncher};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(
    spec: Option<String>,
    spec_file: Option<PathBuf>,
    config_path: Option<PathBuf>,
    interactive_fallback: bool,
) -> Result<()> {
    let spec_text = match (spec, spec_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading specification from {}", path.display()))?,
        (None, None) => bail!("either --spec or --spec-file is required"),
    };
    if spec_text.trim().is_empty() {
        bail!("the specification text is empty");
    }

    let mut config = super::load_config(config_path)?;
    if interactive_fallback {
        config.execution.interactive_fallback = true;
    }

    let generate = CommandRoleAgent::new(Role::Generate, config.agents.generate.clone())
        .context("the [agents] section must configure a generate command")?;
    let validate = CommandRoleAgent::new(Role::Validate, config.agents.validate.clone())
        .context("the [agents] section must configure a validate command")?;
    generate.is_available().await?;
    validate.is_available().await?;

    let audit = Arc::new(AuditCounters::new());
    let compiler = Arc::new(CompilerService::new(
        config.build.clone(),
        Arc::clone(&audit),
        Arc::new(DotnetBuildTool::new(&config.build.tool)),
    ));
    let runner = Arc::new(ExecutionRunner::new(
        config.execution.clone(),
        Arc::clone(&audit),
        Arc::new(HostBinaryLauncher::new(&config.execution.runtime_host)),
    ));

    let agents: Vec<Arc<dyn RoleAgent>> = vec![
        Arc::new(generate),
        Arc::new(BuildRoleAgent::new(compiler)),
        Arc::new(RunRoleAgent::new(runner)),
        Arc::new(validate),
    ];

    let pipeline = Pipeline::new(config.workflow, audit, agents)?;
    let report = pipeline.run(&spec_text).await?;

    println!(
        "run {} finished: {:?} after {} cycle(s), {} turn(s), {} compile(s), {} run(s)",
        report.run_id,
        report.outcome,
        report.cycles,
        report.turns,
        report.audit.compile,
        report.audit.execute,
    );

    if report.outcome != WorkflowOutcome::Success {
        bail!("the pipeline did not reach a validated result");
    }
    Ok(())
}
