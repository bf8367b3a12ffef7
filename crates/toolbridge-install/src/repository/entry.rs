//! Entry file resolution for fetched repositories.

use std::path::Path;

/// Conventional entry files, checked in order after the explicit candidates.
pub const CONVENTIONAL_ENTRIES: &[&str] = &[
    "dist/index.js",
    "build/index.js",
    "dist/server.js",
    "build/server.js",
    "index.js",
    "server.js",
    "main.js",
    "src/index.js",
];

const DEFAULT_ENTRY: &str = "index.js";

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "mts", "py"];

/// File name of the first launch argument when it names a script.
fn explicit_entry(args: &[String]) -> Option<String> {
    let first = Path::new(args.first()?);
    let has_script_ext = first
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e));
    if !has_script_ext {
        return None;
    }
    first
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Resolve the entry file relative to `dir`.
///
/// Precedence: explicit first argument, `main` from the manifest, then
/// `CONVENTIONAL_ENTRIES`. Every candidate must exist on disk. When none does,
/// the explicit argument (or `index.js`) is returned anyway.
pub fn resolve_entry_file(
    dir: &Path,
    args: &[String],
    package_json: Option<&serde_json::Value>,
) -> String {
    let explicit = explicit_entry(args);
    let main = package_json
        .and_then(|p| p.get("main"))
        .and_then(serde_json::Value::as_str)
        .map(|m| m.trim_start_matches("./").to_string());

    let candidates = explicit
        .iter()
        .cloned()
        .chain(main)
        .chain(CONVENTIONAL_ENTRIES.iter().map(|e| (*e).to_string()));

    for candidate in candidates {
        if dir.join(&candidate).is_file() {
            return candidate;
        }
    }

    let fallback = explicit.unwrap_or_else(|| DEFAULT_ENTRY.to_string());
    tracing::warn!(
        dir = %dir.display(),
        entry = %fallback,
        "No entry file found on disk, keeping default"
    );
    fallback
}

/// Whether a build step has already produced output.
pub fn has_build_output(dir: &Path) -> bool {
    ["dist", "build"].iter().any(|d| dir.join(d).is_dir())
}
