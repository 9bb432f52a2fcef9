use anyhow::{Result, bail};
use std::path::PathBuf;
use tokio::process::Command;

/// Verifies the external programs the pipeline depends on are reachable.
pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_path)?;

    let mut checks = vec![
        ("build tool", vec![config.build.tool.clone(), "--version".to_string()]),
        (
            "runtime host",
            vec![config.execution.runtime_host.clone(), "--version".to_string()],
        ),
    ];
    if let Some(program) = config.agents.generate.first() {
        checks.push(("generate command", vec![program.clone()]));
    } else {
        println!("generate command: not configured");
    }
    if let Some(program) = config.agents.validate.first() {
        checks.push(("validate command", vec![program.clone()]));
    } else {
        println!("validate command: not configured");
    }

    let mut broken = Vec::new();
    for (label, argv) in checks {
        match probe(&argv).await {
            Ok(detail) => println!("{label}: ok ({detail})"),
            Err(reason) => {
                println!("{label}: MISSING ({reason})");
                broken.push(label);
            }
        }
    }

    if !broken.is_empty() {
        bail!("unusable dependencies: {}", broken.join(", "));
    }
    println!("all checks passed");
    Ok(())
}

/// Probes a program. With only a program name, checks PATH; with arguments,
/// runs it and reports the first output line.
async fn probe(argv: &[String]) -> std::result::Result<String, String> {
    if argv.len() == 1 {
        #[cfg(unix)]
        let lookup = "which";
        #[cfg(windows)]
        let lookup = "where";

        let output = Command::new(lookup)
            .arg(&argv[0])
            .output()
            .await
            .map_err(|e| e.to_string())?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        return Err(format!("'{}' not found in PATH", argv[0]));
    }

    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .await
        .map_err(|e| format!("failed to start '{}': {e}", argv[0]))?;
    if !output.status.success() {
        return Err(format!("'{}' exited with {}", argv[0], output.status));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or("no output").trim().to_string())
}
