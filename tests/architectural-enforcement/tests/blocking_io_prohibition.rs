//! Integration Test: Blocking I/O Prohibition
//!
//! All I/O reached from async code must be async: history files go through
//! `tokio::fs`, HTTP through async `reqwest`, stdin through `tokio::io`.
//!
//! **Policy**: no `std::fs`, `std::net`, `std::process::Command` or
//! `reqwest::blocking` inside an `async fn`.
//! **Allowed**: plain functions that run before the runtime starts or off
//! the async path, and test code.
//!
//! Config loading reads the file with `std::fs`, so the loaders themselves
//! must not be called from an `async fn` either; the CLI loads its config
//! in `main` before building the runtime.

use std::fs;
use std::path::{Path, PathBuf};

/// Plain functions that do blocking file I/O internally
const BLOCKING_HELPERS: &[&str] = &[
    "load_config(",
    "load_config_from_path(",
    "load_config_with_env(",
];

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nForbidden in async fn:");
        eprintln!("  - std::fs::*, std::net::*, std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("  - std::io::stdin()");
        eprintln!("\nUse instead:");
        eprintln!("  - tokio::fs, tokio::net, tokio::process");
        eprintln!("  - tokio::io::stdin() with AsyncBufReadExt::lines");

        panic!("\nFound {} blocking I/O violation(s).", violations.len());
    }
}

fn find_blocking_io_violations() -> Vec<String> {
    let root = workspace_root();
    let mut violations = Vec::new();
    for dir in ["chatline/core/src", "chatline/cli/src"] {
        check_directory(&root.join(dir), &mut violations);
    }
    violations
}

fn check_directory(dir: &Path, violations: &mut Vec<String>) {
    assert!(dir.exists(), "missing source directory {}", dir.display());

    for entry in walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
            check_file(entry.path(), violations);
        }
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();
    let end = lines
        .windows(2)
        .position(|w| w[0].trim() == "#[cfg(test)]" && w[1].trim_start().starts_with("mod "))
        .unwrap_or(lines.len());

    for (idx, line) in lines[..end].iter().enumerate() {
        let code_part = line.split("//").next().unwrap_or(line);

        // Never acceptable, async or not
        if code_part.contains("reqwest::blocking") {
            violations.push(format!(
                "{}:{} - Blocking HTTP client: {}",
                path.display(),
                idx + 1,
                line.trim()
            ));
            continue;
        }

        if !is_in_async_function(&lines, idx) {
            continue;
        }

        let kind = if code_part.contains("std::fs::") {
            Some("Blocking file I/O")
        } else if code_part.contains("std::net::") {
            Some("Blocking network I/O")
        } else if code_part.contains("std::process::Command") {
            Some("Blocking process I/O")
        } else if code_part.contains("std::io::stdin()") {
            Some("Blocking stdin in async")
        } else if calls_blocking_helper(code_part) {
            Some("Blocking config load in async")
        } else {
            None
        };

        if let Some(kind) = kind {
            violations.push(format!(
                "{}:{} - {kind}: {}",
                path.display(),
                idx + 1,
                line.trim()
            ));
        }
    }
}

fn calls_blocking_helper(code: &str) -> bool {
    !code.contains("fn ") && BLOCKING_HELPERS.iter().any(|helper| code.contains(helper))
}

/// Whether the nearest enclosing `fn` above the line is `async`
fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..=current_idx).rev() {
        let line = lines[i].trim();

        if line.contains("async fn ") || line.contains("async move") {
            return true;
        }
        if line.contains("fn ") && !line.contains("async") {
            return false;
        }
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_read_in_async_fn_is_detected() {
        let code = vec![
            "pub async fn load(&self) -> AppState {",
            "    let raw = std::fs::read_to_string(&self.path);",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
    }

    #[test]
    fn test_plain_fn_is_allowed() {
        let code = vec![
            "pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {",
            "    let raw = std::fs::read_to_string(path)?;",
            "}",
        ];
        assert!(!is_in_async_function(&code, 1));
    }

    #[test]
    fn test_config_load_in_async_fn_is_detected() {
        let code = vec![
            "async fn run(args: Args) -> Result<()> {",
            "    let config = load_config(&args)?;",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(calls_blocking_helper(code[1]));
        assert!(!calls_blocking_helper("fn load_config(args: &Args) -> Result<ClientConfig> {"));
    }

    #[test]
    fn test_spawned_block_counts_as_async() {
        let code = vec![
            "fn reconcile(&mut self) {",
            "    tokio::spawn(async move {",
            "        std::fs::write(path, body);",
            "    });",
            "}",
        ];
        assert!(is_in_async_function(&code, 2));
    }
}
