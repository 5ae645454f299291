//! Native artifact builder.
//!
//! Compiles the metadata binary for the host triple, runs it twice (once for
//! documentation on stdout, once to export type bindings into an explicit
//! directory), persists the documentation, then packages the library into
//! the binary module.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::builder::graph::{Stage, StageInputs, StageOutput};
use crate::core::manifest::NativeSection;
use crate::core::{HostTriple, Profile};
use crate::util::fs::{ensure_dir, list_files, write_bytes};
use crate::util::process::ProcessBuilder;

/// Files produced by the native stage.
///
/// Downstream stages read these from disk; the descriptor only says where
/// they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    /// Documentation file
    pub docs: PathBuf,
    /// Directory holding the generated type bindings
    pub bindings_dir: PathBuf,
    /// Generated binding files, sorted
    pub bindings: Vec<PathBuf>,
    /// Directory holding the packaged binary module
    pub package_dir: PathBuf,
    /// The binary module itself
    pub module: PathBuf,
}

/// Expand `{out_dir}`, `{library}`, `{profile}` and `{profile_flag}` in
/// packager arguments.
pub fn expand_packager_args(
    args: &[String],
    out_dir: &Path,
    library: &str,
    profile: Profile,
) -> Vec<String> {
    let out_dir = out_dir.to_string_lossy();
    args.iter()
        .map(|arg| {
            arg.replace("{out_dir}", &out_dir)
                .replace("{library}", library)
                .replace("{profile_flag}", profile.packager_flag())
                .replace("{profile}", profile.as_str())
        })
        .collect()
}

/// Builds the native artifacts.
#[derive(Debug, Default)]
pub struct NativeBuilder;

impl NativeBuilder {
    pub fn new() -> Self {
        NativeBuilder
    }

    /// Path of the compiled metadata binary for `triple`.
    ///
    /// Always the debug profile; the binary is an internal tool.
    pub fn metadata_binary(native: &NativeSection, triple: &HostTriple) -> PathBuf {
        native
            .target_dir
            .join(triple.as_str())
            .join("debug")
            .join(format!("{}{}", native.metadata_bin, std::env::consts::EXE_SUFFIX))
    }

    /// Run every native step in order.
    pub fn build(&self, ctx: &BuildContext, triple: &HostTriple) -> Result<ArtifactDescriptor, BuildError> {
        let native = &ctx.workspace().manifest().native;

        self.compile_metadata(ctx, native, triple)?;

        let binary = Self::metadata_binary(native, triple);
        let docs = self.generate_docs(ctx, native, &binary)?;
        self.export_bindings(ctx, native, &binary)?;

        write_bytes(&native.docs, &docs).map_err(|e| BuildError::fs(&native.docs, format!("{:#}", e)))?;
        tracing::debug!("wrote {} bytes of docs to {}", docs.len(), native.docs.display());

        self.package(ctx, native)?;

        let bindings = list_files(&native.bindings_dir)
            .map_err(|e| BuildError::fs(&native.bindings_dir, format!("{:#}", e)))?;
        let module = find_module(native)?;

        Ok(ArtifactDescriptor {
            docs: native.docs.clone(),
            bindings_dir: native.bindings_dir.clone(),
            bindings,
            package_dir: native.package_dir.clone(),
            module,
        })
    }

    fn compile_metadata(
        &self,
        ctx: &BuildContext,
        native: &NativeSection,
        triple: &HostTriple,
    ) -> Result<(), BuildError> {
        ctx.events()
            .status("Compiling", format!("{} ({})", native.metadata_bin, triple));

        let cmd = ProcessBuilder::new(&ctx.tools().cargo)
            .args(["build", "--bin", native.metadata_bin.as_str(), "--target", triple.as_str()])
            .arg("--target-dir")
            .arg(&native.target_dir);
        ctx.run(cmd)?;
        Ok(())
    }

    fn generate_docs(
        &self,
        ctx: &BuildContext,
        native: &NativeSection,
        binary: &Path,
    ) -> Result<Vec<u8>, BuildError> {
        ctx.events().status("Generating", "documentation");
        let output = ctx.run(ProcessBuilder::new(binary).args(&native.docs_args))?;
        Ok(output.stdout)
    }

    fn export_bindings(
        &self,
        ctx: &BuildContext,
        native: &NativeSection,
        binary: &Path,
    ) -> Result<(), BuildError> {
        ctx.events().status("Exporting", "type bindings");
        ensure_dir(&native.bindings_dir)
            .map_err(|e| BuildError::fs(&native.bindings_dir, format!("{:#}", e)))?;

        let cmd = ProcessBuilder::new(binary)
            .arg(&native.exports_flag)
            .arg(&native.bindings_dir);
        ctx.run(cmd)?;
        Ok(())
    }

    fn package(&self, ctx: &BuildContext, native: &NativeSection) -> Result<(), BuildError> {
        let profile = ctx.profile();
        ctx.events()
            .status("Packaging", format!("{} [{}]", native.library, profile));

        ensure_dir(&native.package_dir)
            .map_err(|e| BuildError::fs(&native.package_dir, format!("{:#}", e)))?;

        let args = expand_packager_args(
            &native.packager.args,
            &native.package_dir,
            &native.library,
            profile,
        );
        ctx.run(ProcessBuilder::new(&ctx.tools().packager).args(args))?;
        Ok(())
    }
}

/// Locate the packaged binary module, preferring one named after the library.
fn find_module(native: &NativeSection) -> Result<PathBuf, BuildError> {
    let files = list_files(&native.package_dir)
        .map_err(|e| BuildError::fs(&native.package_dir, format!("{:#}", e)))?;

    let modules: Vec<PathBuf> = files
        .into_iter()
        .filter(|f| {
            f.extension()
                .is_some_and(|ext| ext.to_string_lossy() == native.module_extension)
        })
        .collect();

    let stem = native.library.replace('-', "_");
    let preferred = modules.iter().find(|m| {
        m.file_stem()
            .is_some_and(|s| s.to_string_lossy().starts_with(&stem))
    });

    preferred
        .or_else(|| modules.first())
        .cloned()
        .ok_or_else(|| {
            BuildError::fs(
                &native.package_dir,
                format!("packaging produced no .{} module", native.module_extension),
            )
        })
}

impl Stage for NativeBuilder {
    fn name(&self) -> &str {
        "native"
    }

    fn run(&self, ctx: &BuildContext, inputs: &StageInputs<'_>) -> Result<StageOutput, BuildError> {
        let triple = inputs.triple()?;
        self.build(ctx, triple).map(StageOutput::Native)
    }
}
