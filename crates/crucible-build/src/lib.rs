//! Build side of the pipeline: request normalization, signature-keyed
//! deduplication and compiler invocation.

pub mod cache;
pub mod compiler;
pub mod metadata;
pub mod normalize;
pub mod request;
pub mod signature;

pub use compiler::{BuildResult, BuildTool, CompilerService, DotnetBuildTool};
pub use metadata::{AppModel, RunMetadata};
pub use normalize::normalize;
pub use request::BuildRequest;
pub use signature::BuildSignature;
