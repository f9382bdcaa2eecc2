//! Integration Test: Sleep Prohibition
//!
//! Production code in `chatline-core` and the CLI must never sleep to wait
//! for something. Streaming waits on the byte stream, the flush deadline,
//! the stall watchdog and the cancellation token, all inside one `select!`.
//!
//! **Policy**: no `std::thread::sleep` anywhere, no `tokio::time::sleep`
//! outside test code.
//! **Allowed**: deadline timers (`sleep_until`, the token flush timer) and
//! `tokio::time::interval` ticks.

use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nAllowed:");
        eprintln!("  - tokio::time::sleep_until(deadline) inside a select!");
        eprintln!("  - tokio::time::interval(..).tick().await");
        eprintln!("  - test code (#[test], #[tokio::test], #[cfg(test)] modules)");
        eprintln!("\nForbidden:");
        eprintln!("  - std::thread::sleep in any form");
        eprintln!("  - sleeping in a loop to poll for state");

        panic!("\nFound {} sleep violation(s).", violations.len());
    }
}

fn find_sleep_violations() -> Vec<String> {
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

    for (idx, line) in production_lines(&lines) {
        let code_part = line.split("//").next().unwrap_or(line);

        if code_part.contains("thread::sleep") {
            violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
            continue;
        }

        if !(code_part.contains("::sleep(") || code_part.contains(".sleep(")) {
            continue;
        }
        if is_in_test_function(&lines, idx)
            || is_deadline_timer(code_part)
            || is_interval_pattern(&lines, idx)
        {
            continue;
        }
        violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
    }
}

/// Lines before the first `#[cfg(test)]` module
fn production_lines<'a>(lines: &'a [&'a str]) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    let end = lines
        .windows(2)
        .position(|w| w[0].trim() == "#[cfg(test)]" && w[1].trim_start().starts_with("mod "))
        .unwrap_or(lines.len());
    lines[..end].iter().copied().enumerate()
}

fn is_in_test_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if (line.starts_with("fn ") || line.starts_with("async fn ")) && !line.contains("test") {
            return false;
        }
        if line.starts_with("mod ") || line.starts_with("impl ") {
            return false;
        }
    }
    false
}

/// A sleep until a fixed instant, raced against I/O in a `select!`
fn is_deadline_timer(code: &str) -> bool {
    code.contains("sleep_until(") || code.contains("timer().sleep()")
}

fn is_interval_pattern(lines: &[&str], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(20);
    let end = std::cmp::min(current_idx + 5, lines.len());
    lines[start..end]
        .iter()
        .any(|l| l.contains("interval.tick()") || l.contains("tokio::time::interval"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polling_sleep_is_not_a_test() {
        let code = vec![
            "async fn wait_until_done(session: &StreamSession) {",
            "    while session.is_active() {",
            "        tokio::time::sleep(Duration::from_millis(10)).await;",
            "    }",
            "}",
        ];
        assert!(!is_in_test_function(&code, 2));
        assert!(!is_deadline_timer(code[2]));
        assert!(!is_interval_pattern(&code, 2));
    }

    #[test]
    fn test_flush_deadline_is_allowed() {
        assert!(is_deadline_timer(
            "() = tokio::time::sleep_until(read_deadline) => Wake::ReadTimeout,"
        ));
        assert!(is_deadline_timer(
            "() = self.throttle.timer().sleep() => Wake::FlushDue,"
        ));
    }

    #[test]
    fn test_cfg_test_module_is_skipped() {
        let code = vec![
            "fn production() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    std::thread::sleep(Duration::from_millis(1));",
            "}",
        ];
        let kept: Vec<_> = production_lines(&code).map(|(i, _)| i).collect();
        assert_eq!(kept, vec![0]);
    }
}
