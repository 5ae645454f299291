//! Stagehand.toml manifest parsing and schema.
//!
//! The manifest declares every stage of the pipeline: the native metadata
//! binary and packaged library, the bundle targets, the postbuild pass, the
//! type check and the asset copy. Paths are resolved against the manifest's
//! directory at load time, so everything downstream works with absolute
//! paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::target::{BuildTarget, OutputFormat, OutputLocation, PackagingStrategy, Plugin};
use crate::util::fs::paths_overlap;

/// Manifest file name.
pub const MANIFEST_NAME: &str = "Stagehand.toml";

/// Errors found while locating, parsing or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not find `Stagehand.toml` in `{}` or any parent directory", .0.display())]
    NotFound(PathBuf),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("`{section}.{field}` must not be empty")]
    EmptyField {
        section: &'static str,
        field: &'static str,
    },

    #[error("at least one [[bundle]] target is required")]
    NoTargets,

    #[error("duplicate bundle target `{0}`")]
    DuplicateTarget(String),

    #[error("bundle target `{0}` must set exactly one of `outdir` or `outfile`")]
    AmbiguousOutput(String),

    #[error("bundle target `{target}` selects no packaging strategy (plugins: [{plugins}])")]
    NoStrategy { target: String, plugins: String },

    #[error("bundle target `{target}` selects conflicting packaging strategies: {strategies}")]
    ConflictingStrategies { target: String, strategies: String },

    #[error("bundle target `{0}` enables `splitting` but does not use the `binary-split` plugin")]
    SplittingWithoutSplit(String),

    #[error("split bundle target `{0}` must write to an `outdir`")]
    SplitNeedsOutdir(String),

    #[error("inline bundle target `{0}` must write a single `outfile`")]
    InlineNeedsOutfile(String),

    #[error("bundle targets `{first}` and `{second}` write overlapping output paths")]
    OverlappingOutputs { first: String, second: String },

    #[error("postbuild source `{0}` is not a bundle target")]
    UnknownPostbuildSource(String),

    #[error("postbuild source `{0}` must be a split target")]
    PostbuildSourceNotSplit(String),

    #[error("{output} `{}` overlaps {source_kind} `{}`", .output_path.display(), .source_path.display())]
    OutputOverlapsSource {
        output: String,
        output_path: PathBuf,
        source_kind: &'static str,
        source_path: PathBuf,
    },
}

/// `[project]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: String,
}

/// `[native]` table: the metadata binary and the packaged library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NativeSection {
    /// Cargo binary target that emits docs and type bindings
    pub metadata_bin: String,

    /// Library packaged into the binary module
    pub library: String,

    /// Cargo target directory
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,

    /// Documentation output file
    pub docs: PathBuf,

    /// Directory the generated type bindings are written to
    pub bindings_dir: PathBuf,

    /// Directory the packaged binary module is written to
    pub package_dir: PathBuf,

    /// Arguments asking the metadata binary for documentation on stdout
    #[serde(default = "default_docs_args")]
    pub docs_args: Vec<String>,

    /// Flag introducing the bindings output directory
    #[serde(default = "default_exports_flag")]
    pub exports_flag: String,

    /// File extension of the binary module (without the dot)
    #[serde(default = "default_module_extension")]
    pub module_extension: String,

    #[serde(default)]
    pub packager: PackagerSection,
}

fn default_target_dir() -> PathBuf {
    PathBuf::from("target")
}

fn default_docs_args() -> Vec<String> {
    vec!["--docs".to_string()]
}

fn default_exports_flag() -> String {
    "--exports-dir".to_string()
}

fn default_module_extension() -> String {
    "wasm".to_string()
}

/// `[native.packager]` table.
///
/// Arguments may contain `{out_dir}`, `{library}`, `{profile}` and
/// `{profile_flag}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagerSection {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for PackagerSection {
    fn default() -> Self {
        PackagerSection {
            program: "wasm-pack".to_string(),
            args: [
                "build",
                "--target",
                "web",
                "--out-dir",
                "{out_dir}",
                "--out-name",
                "{library}",
                "{profile_flag}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// `[[bundle]]` entry as written in the manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct BundleSection {
    name: String,
    entry: PathBuf,
    #[serde(default)]
    format: OutputFormat,
    outdir: Option<PathBuf>,
    outfile: Option<PathBuf>,
    #[serde(default)]
    plugins: Vec<Plugin>,
    #[serde(default)]
    splitting: bool,
    #[serde(default)]
    external: Vec<String>,
    #[serde(default)]
    minify: bool,
    #[serde(default = "default_true")]
    check: bool,
}

fn default_true() -> bool {
    true
}

/// `[postbuild]` table: the shim-eliminating second pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostbuildSection {
    /// Name of the split target whose entry file is re-bundled
    pub source: String,

    /// Patterns kept external during the second pass
    pub external: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPostbuild {
    source: String,
    external: Option<Vec<String>>,
}

/// The binary module and both worker entry points stay external by default.
fn default_postbuild_external(module_extension: &str) -> Vec<String> {
    vec![
        format!("*.{}", module_extension),
        "*.worker.js".to_string(),
        "*.main.js".to_string(),
    ]
}

/// `[typecheck]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypecheckSection {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for TypecheckSection {
    fn default() -> Self {
        TypecheckSection {
            program: "tsc".to_string(),
            args: vec![
                "--project".to_string(),
                "tsconfig.json".to_string(),
                "--noEmit".to_string(),
            ],
        }
    }
}

/// `[assets]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetsSection {
    /// Glob pattern of assets to copy
    pub from: String,
    /// Destination directory
    pub to: PathBuf,
}

/// `[tools]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub rustc: String,
    pub cargo: String,
    /// Bundler driver: program followed by its fixed arguments
    pub bundler: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        ToolsSection {
            rustc: "rustc".to_string(),
            cargo: "cargo".to_string(),
            bundler: vec!["node".to_string(), "tools/bundle.mjs".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    project: ProjectSection,
    native: NativeSection,
    #[serde(default)]
    bundle: Vec<BundleSection>,
    postbuild: Option<RawPostbuild>,
    #[serde(default)]
    typecheck: TypecheckSection,
    assets: Option<AssetsSection>,
    #[serde(default)]
    tools: ToolsSection,
}

/// A parsed, validated manifest with absolute paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub project: ProjectSection,
    pub native: NativeSection,
    pub targets: Vec<BuildTarget>,
    pub postbuild: Option<PostbuildSection>,
    pub typecheck: TypecheckSection,
    pub assets: Option<AssetsSection>,
    pub tools: ToolsSection,
}

impl Manifest {
    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        let root = path.parent().unwrap_or(Path::new("."));

        Self::parse(&contents, root).with_context(|| format!("invalid manifest: {}", path.display()))
    }

    /// Parse manifest text, resolving relative paths against `root`.
    pub fn parse(contents: &str, root: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(contents)?;

        let targets = raw
            .bundle
            .into_iter()
            .map(|section| resolve_target(section, root))
            .collect::<Result<Vec<_>, _>>()?;

        let mut native = raw.native;
        native.target_dir = root.join(&native.target_dir);
        native.docs = root.join(&native.docs);
        native.bindings_dir = root.join(&native.bindings_dir);
        native.package_dir = root.join(&native.package_dir);

        let assets = raw.assets.map(|assets| AssetsSection {
            from: if Path::new(&assets.from).is_absolute() {
                assets.from
            } else {
                root.join(&assets.from).to_string_lossy().into_owned()
            },
            to: root.join(&assets.to),
        });

        let postbuild = raw.postbuild.map(|p| PostbuildSection {
            source: p.source,
            external: p
                .external
                .unwrap_or_else(|| default_postbuild_external(&native.module_extension)),
        });

        let manifest = Manifest {
            project: raw.project,
            native,
            targets,
            postbuild,
            typecheck: raw.typecheck,
            assets,
            tools: raw.tools,
        };
        manifest.validate(root)?;

        Ok(manifest)
    }

    fn validate(&self, root: &Path) -> Result<(), ManifestError> {
        if self.project.name.trim().is_empty() {
            return Err(ManifestError::EmptyField {
                section: "project",
                field: "name",
            });
        }
        if self.native.metadata_bin.trim().is_empty() {
            return Err(ManifestError::EmptyField {
                section: "native",
                field: "metadata-bin",
            });
        }
        if self.native.library.trim().is_empty() {
            return Err(ManifestError::EmptyField {
                section: "native",
                field: "library",
            });
        }
        if self.tools.bundler.is_empty() {
            return Err(ManifestError::EmptyField {
                section: "tools",
                field: "bundler",
            });
        }

        if self.targets.is_empty() {
            return Err(ManifestError::NoTargets);
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if !names.insert(target.name.as_str()) {
                return Err(ManifestError::DuplicateTarget(target.name.clone()));
            }
            target.validate()?;
        }

        for (i, first) in self.targets.iter().enumerate() {
            for second in &self.targets[i + 1..] {
                if paths_overlap(first.output.path(), second.output.path()) {
                    return Err(ManifestError::OverlappingOutputs {
                        first: first.name.clone(),
                        second: second.name.clone(),
                    });
                }
            }
        }

        if let Some(ref postbuild) = self.postbuild {
            let source = self
                .target(&postbuild.source)
                .ok_or_else(|| ManifestError::UnknownPostbuildSource(postbuild.source.clone()))?;
            if source.strategy()? != PackagingStrategy::Split {
                return Err(ManifestError::PostbuildSourceNotSplit(postbuild.source.clone()));
            }
        }

        if let Some(ref assets) = self.assets {
            if assets.from.trim().is_empty() || assets.to == root {
                return Err(ManifestError::EmptyField {
                    section: "assets",
                    field: if assets.from.trim().is_empty() { "from" } else { "to" },
                });
            }
        }

        self.check_outputs_avoid_sources()
    }

    /// Every declared output is rewritten by a build and removed by `clean`,
    /// so none may contain or sit inside a source path or another stage's
    /// output directory.
    fn check_outputs_avoid_sources(&self) -> Result<(), ManifestError> {
        let mut sources: Vec<(&'static str, PathBuf)> = self
            .targets
            .iter()
            .map(|t| ("entry", t.entry.clone()))
            .collect();
        sources.push(("native.bindings-dir", self.native.bindings_dir.clone()));
        sources.push(("native.docs", self.native.docs.clone()));
        if let Some(ref assets) = self.assets {
            sources.push(("assets.from", glob_base(&assets.from)));
        }

        let mut outputs: Vec<(String, PathBuf)> = self
            .targets
            .iter()
            .map(|t| (format!("bundle target `{}`", t.name), t.output.path().to_path_buf()))
            .collect();
        if let Some(ref assets) = self.assets {
            outputs.push(("assets.to".to_string(), assets.to.clone()));
        }

        let package_dir = &self.native.package_dir;
        for (output, output_path) in &outputs {
            if paths_overlap(output_path, package_dir) {
                return Err(ManifestError::OutputOverlapsSource {
                    output: output.clone(),
                    output_path: output_path.clone(),
                    source_kind: "native.package-dir",
                    source_path: package_dir.clone(),
                });
            }
        }

        outputs.push(("native.package-dir".to_string(), package_dir.clone()));
        for (output, output_path) in &outputs {
            for (kind, source_path) in &sources {
                if paths_overlap(output_path, source_path) {
                    return Err(ManifestError::OutputOverlapsSource {
                        output: output.clone(),
                        output_path: output_path.clone(),
                        source_kind: kind,
                        source_path: source_path.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Look up a bundle target by name.
    pub fn target(&self, name: &str) -> Option<&BuildTarget> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// The directory part of a glob pattern, up to the first wildcard component.
fn glob_base(pattern: &str) -> PathBuf {
    Path::new(pattern)
        .components()
        .take_while(|c| {
            !c.as_os_str()
                .to_string_lossy()
                .contains(|ch: char| matches!(ch, '*' | '?' | '['))
        })
        .collect()
}

fn resolve_target(section: BundleSection, root: &Path) -> Result<BuildTarget, ManifestError> {
    let output = match (section.outdir, section.outfile) {
        (Some(dir), None) => OutputLocation::Dir(root.join(dir)),
        (None, Some(file)) => OutputLocation::File(root.join(file)),
        _ => return Err(ManifestError::AmbiguousOutput(section.name)),
    };

    Ok(BuildTarget {
        name: section.name,
        entry: root.join(section.entry),
        format: section.format,
        output,
        plugins: section.plugins,
        splitting: section.splitting,
        external: section.external,
        minify: section.minify,
        check: section.check,
    })
}
