//! Bundle target definitions - what the bundler produces.
//!
//! A [`BuildTarget`] describes one distribution variant of the entry module.
//! Its plugin list selects exactly one [`PackagingStrategy`] for the binary
//! module: referenced externally, embedded inline, or split into lazily
//! loaded chunks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::manifest::ManifestError;

/// Node platform modules that must never be pulled into a browser bundle.
pub const NODE_BUILTIN_MODULES: &[&str] = &[
    "fs",
    "path",
    "url",
    "os",
    "crypto",
    "module",
    "worker_threads",
    "node:*",
];

/// Module format of the bundler's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// ES module
    #[default]
    Esm,
    /// Immediately-invoked function expression (classic script)
    Iife,
    /// CommonJS
    Cjs,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Esm => "esm",
            OutputFormat::Iife => "iife",
            OutputFormat::Cjs => "cjs",
        }
    }

    /// File extension of emitted entry files.
    pub fn extension(&self) -> &'static str {
        "js"
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a target packages the binary module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackagingStrategy {
    /// Binary module loaded at runtime from an external path/URL
    External,
    /// Binary module bytes embedded in a single-file bundle
    Inline,
    /// Binary module external, code split into lazily loaded chunks
    Split,
}

impl fmt::Display for PackagingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PackagingStrategy::External => "external",
            PackagingStrategy::Inline => "inline",
            PackagingStrategy::Split => "split",
        })
    }
}

/// A bundler plugin capability requested by a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Plugin {
    BinaryExternal,
    BinaryInline,
    BinarySplit,
    /// Mark node platform modules external
    NodeExternals,
    /// Any other plugin, passed through to the bundler driver by name
    Custom(String),
}

impl Plugin {
    /// The packaging strategy this plugin selects, if any.
    pub fn strategy(&self) -> Option<PackagingStrategy> {
        match self {
            Plugin::BinaryExternal => Some(PackagingStrategy::External),
            Plugin::BinaryInline => Some(PackagingStrategy::Inline),
            Plugin::BinarySplit => Some(PackagingStrategy::Split),
            Plugin::NodeExternals | Plugin::Custom(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Plugin::BinaryExternal => "binary-external",
            Plugin::BinaryInline => "binary-inline",
            Plugin::BinarySplit => "binary-split",
            Plugin::NodeExternals => "node-externals",
            Plugin::Custom(name) => name,
        }
    }
}

impl FromStr for Plugin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("plugin name must not be empty".to_string()),
            "binary-external" => Ok(Plugin::BinaryExternal),
            "binary-inline" => Ok(Plugin::BinaryInline),
            "binary-split" => Ok(Plugin::BinarySplit),
            "node-externals" => Ok(Plugin::NodeExternals),
            other => Ok(Plugin::Custom(other.to_string())),
        }
    }
}

impl TryFrom<String> for Plugin {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Plugin> for String {
    fn from(plugin: Plugin) -> Self {
        plugin.name().to_string()
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a target writes its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLocation {
    /// A directory of output files
    Dir(PathBuf),
    /// A single output file
    File(PathBuf),
}

impl OutputLocation {
    pub fn path(&self) -> &Path {
        match self {
            OutputLocation::Dir(p) | OutputLocation::File(p) => p,
        }
    }
}

/// One distribution variant of the entry module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTarget {
    /// Unique target name
    pub name: String,
    /// Entry module path
    pub entry: PathBuf,
    pub format: OutputFormat,
    pub output: OutputLocation,
    /// Plugin capabilities, in the order handed to the bundler
    pub plugins: Vec<Plugin>,
    /// Emit shared code into lazily loaded chunks
    pub splitting: bool,
    /// Module patterns left unbundled
    pub external: Vec<String>,
    pub minify: bool,
    /// Verify the packaging contract on the emitted bundle
    pub check: bool,
}

impl BuildTarget {
    /// Determine the packaging strategy selected by the plugin list.
    ///
    /// Exactly one strategy plugin must be present.
    pub fn strategy(&self) -> Result<PackagingStrategy, ManifestError> {
        let strategies: Vec<PackagingStrategy> =
            self.plugins.iter().filter_map(Plugin::strategy).collect();

        match strategies.as_slice() {
            [only] => Ok(*only),
            [] => Err(ManifestError::NoStrategy {
                target: self.name.clone(),
                plugins: self.plugin_names().join(", "),
            }),
            many => Err(ManifestError::ConflictingStrategies {
                target: self.name.clone(),
                strategies: many
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Check the target's internal consistency and return its strategy.
    pub fn validate(&self) -> Result<PackagingStrategy, ManifestError> {
        let strategy = self.strategy()?;

        match (strategy, &self.output) {
            (PackagingStrategy::Split, OutputLocation::File(_)) => {
                return Err(ManifestError::SplitNeedsOutdir(self.name.clone()));
            }
            (PackagingStrategy::Inline, OutputLocation::Dir(_)) => {
                return Err(ManifestError::InlineNeedsOutfile(self.name.clone()));
            }
            _ => {}
        }

        if self.splitting && strategy != PackagingStrategy::Split {
            return Err(ManifestError::SplittingWithoutSplit(self.name.clone()));
        }

        Ok(strategy)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// File stem of the entry module (`viewer` for `src/ts/viewer.ts`).
    pub fn entry_stem(&self) -> String {
        self.entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    /// The main file this target emits; a deterministic function of the
    /// entry point, format and output location.
    pub fn primary_output(&self) -> PathBuf {
        match &self.output {
            OutputLocation::File(file) => file.clone(),
            OutputLocation::Dir(dir) => {
                dir.join(format!("{}.{}", self.entry_stem(), self.format.extension()))
            }
        }
    }

    /// Whether chunk splitting is in effect for this target.
    pub fn splits(&self) -> bool {
        self.splitting || self.plugins.contains(&Plugin::BinarySplit)
    }

    /// Module patterns to mark external, including node builtins where the
    /// strategy or plugin list requires them. Order is preserved and
    /// duplicates are dropped.
    pub fn external_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = Vec::new();
        let mut push = |m: &str| {
            if !modules.iter().any(|existing| existing == m) {
                modules.push(m.to_string());
            }
        };

        for pattern in &self.external {
            push(pattern);
        }

        let wants_node_externals = self.plugins.contains(&Plugin::NodeExternals)
            || self.plugins.contains(&Plugin::BinaryExternal);
        if wants_node_externals {
            for module in NODE_BUILTIN_MODULES {
                push(module);
            }
        }

        modules
    }
}
