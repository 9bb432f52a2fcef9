//! Canonical build request model.
//!
//! A `BuildRequest` is constructed fresh per compile attempt by the
//! normalizer and never mutated afterwards. Reference collections are
//! BTree-based so set-equal requests serialize identically regardless of
//! the order the payload listed them in.

use crate::metadata::AppModel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// MSBuild output kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputKind {
    #[default]
    #[serde(alias = "exe", alias = "console")]
    Exe,
    #[serde(alias = "winexe", alias = "windows")]
    WinExe,
    #[serde(alias = "library")]
    Library,
}

impl OutputKind {
    pub fn msbuild_value(self) -> &'static str {
        match self {
            OutputKind::Exe => "Exe",
            OutputKind::WinExe => "WinExe",
            OutputKind::Library => "Library",
        }
    }
}

/// A NuGet-style package reference with an optional pinned version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PackageReferenceRepr")]
pub struct PackageReference {
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl PackageReference {
    pub fn new(id: impl Into<String>, version: Option<String>) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

/// Accepts either an object form or a bare `"Id"` / `"Id@Version"` string.
#[derive(Deserialize)]
#[serde(untagged)]
enum PackageReferenceRepr {
    Structured {
        #[serde(alias = "Id", alias = "name")]
        id: String,
        #[serde(default, alias = "Version")]
        version: Option<String>,
    },
    Bare(String),
}

impl From<PackageReferenceRepr> for PackageReference {
    fn from(repr: PackageReferenceRepr) -> Self {
        match repr {
            PackageReferenceRepr::Structured { id, version } => Self { id, version },
            PackageReferenceRepr::Bare(raw) => match raw.split_once('@') {
                Some((id, version)) => Self::new(id.trim(), Some(version.trim().to_string())),
                None => Self::new(raw.trim(), None),
            },
        }
    }
}

/// Project-level settings reflected into the generated project descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub sdk: String,
    #[serde(alias = "outputKind", alias = "output_type", alias = "outputType")]
    pub output_kind: OutputKind,
    #[serde(alias = "targetFramework", alias = "tfm")]
    pub target_framework: String,
    pub nullable: bool,
    #[serde(alias = "implicitUsings")]
    pub implicit_usings: bool,
    #[serde(alias = "allowUnsafe", alias = "unsafe")]
    pub allow_unsafe: bool,
    #[serde(alias = "previewFeatures", alias = "langPreview")]
    pub preview_features: bool,
    #[serde(alias = "warningsAsErrors")]
    pub warnings_as_errors: Option<bool>,
    #[serde(alias = "useWindowsForms", alias = "winforms")]
    pub use_windows_forms: bool,
    #[serde(alias = "useWpf", alias = "wpf")]
    pub use_wpf: bool,
    #[serde(alias = "properties", alias = "extraProperties")]
    pub extra_properties: BTreeMap<String, String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            sdk: "Microsoft.NET.Sdk".to_string(),
            output_kind: OutputKind::Exe,
            target_framework: "net8.0".to_string(),
            nullable: true,
            implicit_usings: true,
            allow_unsafe: false,
            preview_features: false,
            warnings_as_errors: None,
            use_windows_forms: false,
            use_wpf: false,
            extra_properties: BTreeMap::new(),
        }
    }
}

impl ProjectSettings {
    /// True if any GUI toolkit flag is set or a windowed output kind was
    /// requested.
    pub fn wants_gui(&self) -> bool {
        self.use_windows_forms || self.use_wpf || self.output_kind == OutputKind::WinExe
    }
}

/// A fully normalized compile attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    #[serde(alias = "source", alias = "sourceCode", alias = "source_code")]
    pub code: String,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default, alias = "packageReferences", alias = "package_references")]
    pub packages: BTreeSet<PackageReference>,
    #[serde(default, alias = "frameworkReferences")]
    pub framework_references: BTreeSet<String>,
    #[serde(default, alias = "assemblyReferences")]
    pub assembly_references: BTreeSet<PathBuf>,
}

impl BuildRequest {
    /// A request for `code` with all settings at their defaults.
    pub fn from_code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            settings: ProjectSettings::default(),
            packages: BTreeSet::new(),
            framework_references: BTreeSet::new(),
            assembly_references: BTreeSet::new(),
        }
    }

    /// App-model decision recorded at artifact-copy time.
    pub fn app_model(&self) -> AppModel {
        if self.settings.wants_gui() {
            AppModel::Gui
        } else {
            AppModel::Console
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ProjectSettings::default();
        assert_eq!(settings.target_framework, "net8.0");
        assert_eq!(settings.output_kind, OutputKind::Exe);
        assert!(settings.nullable);
        assert!(settings.implicit_usings);
        assert!(!settings.wants_gui());
    }

    #[test]
    fn test_gui_detection() {
        let mut request = BuildRequest::from_code("class P {}");
        assert_eq!(request.app_model(), AppModel::Console);

        request.settings.use_wpf = true;
        assert_eq!(request.app_model(), AppModel::Gui);

        request.settings.use_wpf = false;
        request.settings.output_kind = OutputKind::WinExe;
        assert_eq!(request.app_model(), AppModel::Gui);
    }

    #[test]
    fn test_package_reference_string_forms() {
        let bare: PackageReference = serde_json::from_str(r#""Newtonsoft.Json""#).unwrap();
        assert_eq!(bare.id, "Newtonsoft.Json");
        assert_eq!(bare.version, None);

        let pinned: PackageReference = serde_json::from_str(r#""Newtonsoft.Json@13.0.3""#).unwrap();
        assert_eq!(pinned.version.as_deref(), Some("13.0.3"));

        let structured: PackageReference =
            serde_json::from_str(r#"{"id": "CsvHelper", "version": "30.0.1"}"#).unwrap();
        assert_eq!(structured.id, "CsvHelper");
        assert_eq!(structured.version.as_deref(), Some("30.0.1"));
    }

    #[test]
    fn test_camel_case_aliases() {
        let request: BuildRequest = serde_json::from_str(
            r#"{
                "sourceCode": "class P {}",
                "settings": {"targetFramework": "net7.0", "implicitUsings": false}
            }"#,
        )
        .unwrap();
        assert_eq!(request.settings.target_framework, "net7.0");
        assert!(!request.settings.implicit_usings);
    }
}
