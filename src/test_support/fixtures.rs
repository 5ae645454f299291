//! Test fixtures for common test scenarios.
//!
//! The fixture project is a small viewer component: one metadata binary,
//! one packaged library and three bundle targets covering every packaging
//! strategy. [`fake_toolchain`] teaches a [`MockExecutor`] to behave like
//! the real tools, writing the files each one would.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::{MockExecutor, MockProcessOutput};
use crate::builder::context::BuildContext;
use crate::builder::events::EventSink;
use crate::core::manifest::MANIFEST_NAME;
use crate::core::Workspace;
use crate::util::config::ToolOverrides;
use crate::util::process::ProcessBuilder;

/// Host triple reported by the fake compiler.
pub const TRIPLE: &str = "x86_64-unknown-none-gnu";

/// Manifest of the fixture project.
pub fn viewer_manifest() -> String {
    r#"[project]
name = "viewer"

[native]
metadata-bin = "viewer-metadata"
library = "viewer"
docs = "docs/expressions.md"
bindings-dir = "src/ts/bindings"
package-dir = "dist/wasm"

[[bundle]]
name = "esm"
entry = "src/ts/viewer.ts"
format = "esm"
outfile = "dist/esm/viewer.js"
plugins = ["binary-external"]

[[bundle]]
name = "inline"
entry = "src/ts/viewer.ts"
format = "esm"
outfile = "dist/esm/viewer.inline.js"
plugins = ["binary-inline"]

[[bundle]]
name = "cdn"
entry = "src/ts/viewer.ts"
format = "esm"
outdir = "dist/cdn"
plugins = ["binary-split"]
splitting = true

[postbuild]
source = "cdn"

[assets]
from = "src/themes/*"
to = "dist/css"
"#
    .to_string()
}

/// Create a project directory with the given manifest and a few sources.
pub fn create_test_project(manifest: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    std::fs::write(root.join(MANIFEST_NAME), manifest).unwrap();
    std::fs::create_dir_all(root.join("src/ts")).unwrap();
    std::fs::create_dir_all(root.join("src/themes")).unwrap();
    std::fs::write(
        root.join("src/ts/viewer.ts"),
        "import init from \"../../dist/wasm/viewer.js\";\nexport default init;\n",
    )
    .unwrap();
    std::fs::write(root.join("src/themes/pro.css"), ".viewer { color: #333; }\n").unwrap();
    std::fs::write(root.join("src/themes/pro-dark.css"), ".viewer { color: #eee; }\n").unwrap();
    std::fs::write(root.join("tsconfig.json"), "{ \"include\": [\"src/ts\"] }\n").unwrap();

    tmp
}

/// The fixture project, loaded as a workspace.
pub fn viewer_workspace() -> (TempDir, Workspace) {
    let tmp = create_test_project(&viewer_manifest());
    let ws = Workspace::new(&tmp.path().join(MANIFEST_NAME)).unwrap();
    (tmp, ws)
}

/// A build context over the fixture project that records events and has
/// no tools registered.
pub fn test_context() -> (TempDir, BuildContext) {
    let (tmp, ws) = viewer_workspace();
    let ctx = BuildContext::new(ws, &ToolOverrides::default())
        .with_events(EventSink::capture())
        .with_executor(Arc::new(MockExecutor::new()));
    (tmp, ctx)
}

/// Bytes of the fake binary module.
pub fn module_bytes() -> Vec<u8> {
    let mut bytes = b"\0asm\x01\0\0\0".to_vec();
    bytes.extend((0u8..96).map(|b| b.wrapping_mul(7)));
    bytes
}

/// Write the fake binary module where packaging would put it.
pub fn write_module(root: &Path) -> PathBuf {
    let module = root.join("dist/wasm/viewer_bg.wasm");
    std::fs::create_dir_all(module.parent().unwrap()).unwrap();
    std::fs::write(&module, module_bytes()).unwrap();
    module
}

fn arg_after(cmd: &ProcessBuilder, flag: &str) -> Option<PathBuf> {
    let args = cmd.get_args();
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

/// Teach `exec` to act like the bundler driver.
///
/// Inline bundles carry the module as text, external ones fetch
/// `viewer_bg.wasm`, split ones write an entry plus a chunk. A job with
/// `allow_overwrite` rewrites the entry in place, as the postbuild pass does.
pub fn fake_bundler(exec: &MockExecutor) {
    exec.on_prefix("node", |cmd| {
        let job: serde_json::Value = match cmd.get_stdin().map(serde_json::from_slice::<serde_json::Value>) {
            Some(Ok(job)) => job,
            _ => return MockProcessOutput::failure(1, "bundle job missing on stdin"),
        };

        let has_plugin = |name: &str| {
            job["plugins"]
                .as_array()
                .is_some_and(|p| p.iter().any(|v| v == name))
        };
        let stem = Path::new(job["entry"].as_str().unwrap_or("index.ts"))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let write = |path: &Path, contents: &str| {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        };

        if let Some(outfile) = job["outfile"].as_str() {
            let outfile = Path::new(outfile);
            if has_plugin("binary-inline") {
                write(outfile, "const bytes = \"AGFzbQEAAAA=\";\nexport default bytes;\n");
            } else {
                write(
                    outfile,
                    "export default fetch(new URL(\"viewer_bg.wasm\", import.meta.url));\n",
                );
            }
            write(
                Path::new(&format!("{}.map", outfile.display())),
                "{\"version\":3,\"mappings\":\"\"}",
            );
        } else if let Some(outdir) = job["outdir"].as_str() {
            let outdir = Path::new(outdir);
            let entry = outdir.join(format!("{}.js", stem));
            if job["allow_overwrite"] == true {
                write(&entry, "/* shim folded */\nimport(\"./chunk-a1.js\");\n");
            } else {
                write(&entry, "import(\"./chunk-a1.js\");\n");
                write(
                    &outdir.join("chunk-a1.js"),
                    "export const load = () => fetch(\"viewer_bg.wasm\");\n",
                );
            }
        }

        MockProcessOutput::success("")
    });
}

/// Teach `exec` to act like every tool of a successful run.
pub fn fake_toolchain(exec: &MockExecutor) {
    exec.expect(
        "rustc -vV",
        MockProcessOutput::success(format!("rustc 1.82.0\nhost: {}\nrelease: 1.82.0\n", TRIPLE)),
    );
    exec.expect_prefix("cargo build", MockProcessOutput::success(""));
    exec.expect_contains("viewer-metadata --docs", MockProcessOutput::success("# Expressions\n"));
    exec.on_contains("--exports-dir", |cmd| match arg_after(cmd, "--exports-dir") {
        Some(dir) => {
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("Expression.ts"), "export type Expression = string;\n").unwrap();
            MockProcessOutput::success("")
        }
        None => MockProcessOutput::failure(2, "missing output directory"),
    });
    exec.on_prefix("wasm-pack", |cmd| match arg_after(cmd, "--out-dir") {
        Some(dir) => {
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("viewer_bg.wasm"), module_bytes()).unwrap();
            std::fs::write(dir.join("viewer.js"), "export default function init() {}\n").unwrap();
            MockProcessOutput::success("")
        }
        None => MockProcessOutput::failure(1, "missing --out-dir"),
    });
    fake_bundler(exec);
    exec.expect_prefix("tsc", MockProcessOutput::success(""));
}
