//! Build cache & compiler service.
//!
//! Materializes a throwaway project from a normalized request, invokes the
//! build tool, and on success copies the output tree into a permanent,
//! timestamped artifact directory with a metadata record. Identical
//! requests inside the dedup window are served from cache.

use crate::cache::BuildCache;
use crate::metadata::{AppModel, RunMetadata};
use crate::request::BuildRequest;
use crate::signature::BuildSignature;
use async_trait::async_trait;
use crucible_core::audit::AuditCounters;
use crucible_core::config::BuildConfig;
use crucible_core::{CrucibleError, Result};
use crucible_process::{ProcessOutput, ProcessRequest, ProcessRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Outcome of one compile attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub success: bool,
    pub binary_path: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub app_model: AppModel,
    /// Raw build-tool output lines, in order.
    pub diagnostics: Vec<String>,
    /// The single most recognizable error line, for repair feedback.
    pub primary_error: Option<String>,
}

/// The external build capability, black-boxed behind a trait so tests can
/// substitute it.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Builds the materialized project in `project_dir`, placing output
    /// into `output_dir`.
    async fn build(&self, project_dir: &Path, output_dir: &Path) -> Result<ProcessOutput>;
}

/// Real build tool: invokes `<tool> build` as a detached process. The
/// compiler is left unbounded; it is assumed fast relative to the run
/// timeout.
pub struct DotnetBuildTool {
    tool: String,
    runner: ProcessRunner,
}

impl DotnetBuildTool {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            runner: ProcessRunner::new(),
        }
    }
}

#[async_trait]
impl BuildTool for DotnetBuildTool {
    async fn build(&self, project_dir: &Path, output_dir: &Path) -> Result<ProcessOutput> {
        self.runner
            .run(
                ProcessRequest::new(&self.tool)
                    .arg("build")
                    .arg("-c")
                    .arg("Release")
                    .arg("-o")
                    .arg(output_dir.to_string_lossy())
                    .cwd(project_dir),
            )
            .await
    }
}

/// Compile capability with signature-keyed deduplication.
pub struct CompilerService {
    config: BuildConfig,
    audit: Arc<AuditCounters>,
    tool: Arc<dyn BuildTool>,
    cache: Mutex<BuildCache>,
    builds_performed: AtomicU64,
}

impl CompilerService {
    pub fn new(config: BuildConfig, audit: Arc<AuditCounters>, tool: Arc<dyn BuildTool>) -> Self {
        let ttl = std::time::Duration::from_secs(config.dedup_window_secs);
        Self {
            config,
            audit,
            tool,
            cache: Mutex::new(BuildCache::new(ttl)),
            builds_performed: AtomicU64::new(0),
        }
    }

    /// Real build-tool invocations performed so far (cache hits excluded).
    pub fn builds_performed(&self) -> u64 {
        self.builds_performed.load(Ordering::Relaxed)
    }

    /// Normalizes a raw generation payload and compiles it. A payload the
    /// normalizer rejects still counts as a compile invocation: the
    /// capability ran and produced a (failed) result.
    pub async fn compile_payload(&self, payload: &str) -> Result<BuildResult> {
        match crate::normalize::normalize(payload, &self.config) {
            Ok(request) => self.compile(&request).await,
            Err(err) => {
                self.audit.record_compile();
                let message = err.to_string();
                tracing::warn!(error = %message, "payload rejected by normalizer");
                Ok(BuildResult {
                    success: false,
                    binary_path: None,
                    artifact_dir: None,
                    app_model: AppModel::Console,
                    diagnostics: vec![message.clone()],
                    primary_error: Some(message),
                })
            }
        }
    }

    /// Compiles a request, serving repeats within the dedup window from
    /// cache. Every call counts as a compile invocation for the audit:
    /// the capability was genuinely exercised for that signature even when
    /// the result is cached.
    pub async fn compile(&self, request: &BuildRequest) -> Result<BuildResult> {
        self.audit.record_compile();
        let signature = BuildSignature::of(request)?;

        if let Some(hit) = self.cache.lock().await.get(signature.as_str()) {
            tracing::info!(signature = %signature, "serving compile from dedup cache");
            return Ok(hit);
        }

        let result = self.build_fresh(request).await?;
        self.cache
            .lock()
            .await
            .insert(signature.as_str().to_string(), result.clone());
        Ok(result)
    }

    async fn build_fresh(&self, request: &BuildRequest) -> Result<BuildResult> {
        // TempDir removes the throwaway project on every exit path.
        let scratch = tempfile::tempdir()?;
        let project_dir = scratch.path().join("app");
        let output_dir = scratch.path().join("out");
        std::fs::create_dir_all(&project_dir)?;

        std::fs::write(project_dir.join("Program.cs"), &request.code)?;
        std::fs::write(
            project_dir.join("app.csproj"),
            project_descriptor(request, &self.config),
        )?;

        tracing::info!(tfm = %request.settings.target_framework, "invoking build tool");
        self.builds_performed.fetch_add(1, Ordering::Relaxed);
        let output = self.tool.build(&project_dir, &output_dir).await?;

        let diagnostics: Vec<String> = output
            .stdout
            .lines()
            .chain(output.stderr.lines())
            .map(str::to_string)
            .collect();

        if !output.success() {
            let primary_error = primary_error_line(&diagnostics);
            tracing::warn!(error = ?primary_error, "build failed");
            return Ok(BuildResult {
                success: false,
                binary_path: None,
                artifact_dir: None,
                app_model: request.app_model(),
                diagnostics,
                primary_error,
            });
        }

        let artifact_dir = self.place_artifacts(&output_dir)?;
        let app_model = request.app_model();
        RunMetadata {
            app_model,
            target_framework: request.settings.target_framework.clone(),
            output_kind: request.settings.output_kind.msbuild_value().to_string(),
            use_windows_forms: request.settings.use_windows_forms,
            use_wpf: request.settings.use_wpf,
        }
        .save(&artifact_dir)?;

        let binary_path = locate_binary(&artifact_dir).ok_or_else(|| {
            CrucibleError::build(format!(
                "build reported success but no binary found under {}",
                artifact_dir.display()
            ))
        })?;

        tracing::info!(binary = %binary_path.display(), "build succeeded");
        Ok(BuildResult {
            success: true,
            binary_path: Some(binary_path),
            artifact_dir: Some(artifact_dir),
            app_model,
            diagnostics,
            primary_error: None,
        })
    }

    /// Copies the build output tree into a fresh, UTC-timestamped artifact
    /// directory under the configured root.
    fn place_artifacts(&self, output_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.artifact_root)?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();

        let mut artifact_dir = self.config.artifact_root.join(&stamp);
        let mut attempt = 1;
        while artifact_dir.exists() {
            artifact_dir = self.config.artifact_root.join(format!("{stamp}-{attempt}"));
            attempt += 1;
        }
        copy_tree(output_dir, &artifact_dir)?;
        Ok(artifact_dir)
    }
}

/// Recursively copies the build output tree.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Picks the runnable binary out of an artifact directory: the apphost
/// executable when present, else the portable assembly.
fn locate_binary(artifact_dir: &Path) -> Option<PathBuf> {
    let apphost = artifact_dir.join("app");
    if apphost.is_file() {
        return Some(apphost);
    }
    let exe = artifact_dir.join("app.exe");
    if exe.is_file() {
        return Some(exe);
    }
    let portable = artifact_dir.join("app.dll");
    portable.is_file().then_some(portable)
}

/// Scans diagnostics for a recognizable error line, falling back to the
/// first non-empty line.
fn primary_error_line(diagnostics: &[String]) -> Option<String> {
    diagnostics
        .iter()
        .find(|line| {
            let lower = line.to_lowercase();
            lower.contains("error ") || lower.contains(": error")
        })
        .or_else(|| diagnostics.iter().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string())
}

/// Renders the project descriptor reflecting every setting and reference.
fn project_descriptor(request: &BuildRequest, config: &BuildConfig) -> String {
    let settings = &request.settings;
    let tfm = if settings.target_framework.is_empty() {
        config.default_target_framework.as_str()
    } else {
        settings.target_framework.as_str()
    };
    let on_off = |flag: bool| if flag { "enable" } else { "disable" };

    let mut properties = vec![
        format!("    <OutputType>{}</OutputType>", settings.output_kind.msbuild_value()),
        format!("    <TargetFramework>{}</TargetFramework>", tfm),
        format!("    <Nullable>{}</Nullable>", on_off(settings.nullable)),
        format!("    <ImplicitUsings>{}</ImplicitUsings>", on_off(settings.implicit_usings)),
    ];
    if settings.allow_unsafe {
        properties.push("    <AllowUnsafeBlocks>true</AllowUnsafeBlocks>".to_string());
    }
    if settings.preview_features {
        properties.push("    <LangVersion>preview</LangVersion>".to_string());
    }
    if let Some(warnings_as_errors) = settings.warnings_as_errors {
        properties.push(format!(
            "    <TreatWarningsAsErrors>{}</TreatWarningsAsErrors>",
            warnings_as_errors
        ));
    }
    if settings.use_windows_forms {
        properties.push("    <UseWindowsForms>true</UseWindowsForms>".to_string());
    }
    if settings.use_wpf {
        properties.push("    <UseWPF>true</UseWPF>".to_string());
    }
    for (key, value) in &settings.extra_properties {
        properties.push(format!("    <{key}>{value}</{key}>", key = key, value = value));
    }

    let mut items = Vec::new();
    for package in &request.packages {
        items.push(match &package.version {
            Some(version) => format!(
                r#"    <PackageReference Include="{}" Version="{}" />"#,
                package.id, version
            ),
            None => format!(r#"    <PackageReference Include="{}" />"#, package.id),
        });
    }
    for framework in &request.framework_references {
        items.push(format!(r#"    <FrameworkReference Include="{}" />"#, framework));
    }
    for assembly in &request.assembly_references {
        let path = assembly.display();
        let name = assembly
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        items.push(format!(
            "    <Reference Include=\"{name}\">\n      <HintPath>{path}</HintPath>\n    </Reference>"
        ));
    }

    let item_group = if items.is_empty() {
        String::new()
    } else {
        format!("\n  <ItemGroup>\n{}\n  </ItemGroup>", items.join("\n"))
    };

    format!(
        "<Project Sdk=\"{sdk}\">\n  <PropertyGroup>\n{properties}\n  </PropertyGroup>{item_group}\n</Project>\n",
        sdk = settings.sdk,
        properties = properties.join("\n"),
        item_group = item_group,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{OutputKind, PackageReference};
    use crucible_process::ExitDisposition;
    use std::time::Duration;

    /// Build tool stand-in that fabricates output files instead of
    /// invoking a real compiler.
    struct MockBuildTool {
        succeed: bool,
        stdout: String,
    }

    #[async_trait]
    impl BuildTool for MockBuildTool {
        async fn build(&self, _project_dir: &Path, output_dir: &Path) -> Result<ProcessOutput> {
            if self.succeed {
                std::fs::create_dir_all(output_dir)?;
                std::fs::write(output_dir.join("app.dll"), b"fake assembly")?;
                std::fs::write(output_dir.join("app.deps.json"), b"{}")?;
            }
            Ok(ProcessOutput {
                disposition: if self.succeed {
                    ExitDisposition::Exited(0)
                } else {
                    ExitDisposition::Exited(1)
                },
                stdout: self.stdout.clone(),
                stderr: String::new(),
                duration: Duration::from_millis(5),
            })
        }
    }

    fn service(succeed: bool, stdout: &str, root: &Path) -> (CompilerService, Arc<AuditCounters>) {
        let audit = Arc::new(AuditCounters::new());
        let config = BuildConfig {
            artifact_root: root.to_path_buf(),
            ..BuildConfig::default()
        };
        let tool = Arc::new(MockBuildTool {
            succeed,
            stdout: stdout.to_string(),
        });
        (CompilerService::new(config, audit.clone(), tool), audit)
    }

    #[tokio::test]
    async fn test_success_copies_artifacts_and_writes_metadata() {
        let root = tempfile::tempdir().unwrap();
        let (service, audit) = service(true, "Build succeeded.", root.path());

        let request = BuildRequest::from_code("class P { static void Main() {} }");
        let result = service.compile(&request).await.unwrap();

        assert!(result.success);
        let artifact_dir = result.artifact_dir.unwrap();
        assert!(artifact_dir.starts_with(root.path()));
        assert_eq!(result.binary_path.unwrap(), artifact_dir.join("app.dll"));

        let metadata = RunMetadata::load(&artifact_dir).unwrap();
        assert_eq!(metadata.app_model, AppModel::Console);
        assert_eq!(audit.snapshot().compile, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_second_build_but_counts_invocation() {
        let root = tempfile::tempdir().unwrap();
        let (service, audit) = service(true, "ok", root.path());
        let request = BuildRequest::from_code("class P {}");

        let first = service.compile(&request).await.unwrap();
        let second = service.compile(&request).await.unwrap();

        assert_eq!(first, second);
        // One real build, but two audited capability invocations
        assert_eq!(service.builds_performed(), 1);
        assert_eq!(audit.snapshot().compile, 2);
    }

    #[tokio::test]
    async fn test_different_code_builds_again() {
        let root = tempfile::tempdir().unwrap();
        let (service, _) = service(true, "ok", root.path());

        service.compile(&BuildRequest::from_code("class A {}")).await.unwrap();
        service.compile(&BuildRequest::from_code("class B {}")).await.unwrap();

        assert_eq!(service.builds_performed(), 2);
    }

    #[tokio::test]
    async fn test_failure_extracts_primary_error() {
        let root = tempfile::tempdir().unwrap();
        let stdout = "Determining projects to restore...\nProgram.cs(3,14): error CS1002: ; expected\nBuild FAILED.";
        let (service, _) = service(false, stdout, root.path());

        let result = service.compile(&BuildRequest::from_code("class P {")).await.unwrap();

        assert!(!result.success);
        assert!(result.primary_error.unwrap().contains("CS1002"));
        assert!(result.binary_path.is_none());
        assert_eq!(result.diagnostics.len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_payload_counts_as_invocation() {
        let root = tempfile::tempdir().unwrap();
        let (service, audit) = service(true, "ok", root.path());

        let result = service
            .compile_payload("I could not produce any code, sorry.")
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.binary_path.is_none());
        assert!(result.primary_error.unwrap().contains("Normalization error"));
        // The capability ran and produced a (failed) result
        assert_eq!(audit.snapshot().compile, 1);
        assert_eq!(service.builds_performed(), 0);
    }

    #[tokio::test]
    async fn test_failure_without_error_marker_uses_first_line() {
        let root = tempfile::tempdir().unwrap();
        let (service, _) = service(false, "\nMSBuild went sideways\n", root.path());

        let result = service.compile(&BuildRequest::from_code("class P {")).await.unwrap();
        assert_eq!(result.primary_error.unwrap(), "MSBuild went sideways");
    }

    #[test]
    fn test_project_descriptor_reflects_settings() {
        let mut request = BuildRequest::from_code("class P {}");
        request.settings.allow_unsafe = true;
        request.settings.warnings_as_errors = Some(true);
        request.settings.use_wpf = true;
        request.settings.output_kind = OutputKind::WinExe;
        request
            .settings
            .extra_properties
            .insert("InvariantGlobalization".to_string(), "true".to_string());
        request.packages.insert(PackageReference::new("CsvHelper", Some("30.0.1".into())));
        request.framework_references.insert("Microsoft.WindowsDesktop.App".to_string());

        let xml = project_descriptor(&request, &BuildConfig::default());

        assert!(xml.contains("<OutputType>WinExe</OutputType>"));
        assert!(xml.contains("<AllowUnsafeBlocks>true</AllowUnsafeBlocks>"));
        assert!(xml.contains("<TreatWarningsAsErrors>true</TreatWarningsAsErrors>"));
        assert!(xml.contains("<UseWPF>true</UseWPF>"));
        assert!(xml.contains("<InvariantGlobalization>true</InvariantGlobalization>"));
        assert!(xml.contains(r#"<PackageReference Include="CsvHelper" Version="30.0.1" />"#));
        assert!(xml.contains(r#"<FrameworkReference Include="Microsoft.WindowsDesktop.App" />"#));
    }

    #[test]
    fn test_primary_error_prefers_error_line() {
        let diagnostics = vec![
            "Restoring packages".to_string(),
            "Program.cs(1,1): error CS0103: no".to_string(),
        ];
        assert!(primary_error_line(&diagnostics).unwrap().contains("CS0103"));
    }
}
