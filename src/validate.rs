//! Best-effort syntax validation for merged file content.
//!
//! Unknown languages always pass. Known languages with an available external
//! checker are validated via a short-lived subprocess; missing tools or
//! timeouts are treated the same as "pass", never as failure.

use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use wait_timeout::ChildExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

/// Infer a language tag from a file extension, for prompt context and for
/// selecting a validator. Unknown extensions map to `"text"`.
pub fn infer_language(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "rs" => "rust",
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "c" => "c",
        "h" | "hpp" | "cpp" | "cc" => "cpp",
        _ => "text",
    }
}

/// Validate `content` as `language`. Writes scratch files outside the project
/// tree (a system temp dir) so file-watchers on the user's working tree don't
/// fire spuriously.
pub fn validate(content: &str, language: &str, timeout: Duration) -> ValidationResult {
    match language {
        "json" => validate_json(content),
        "typescript" | "javascript" => validate_with_checker(content, language, timeout),
        "python" => validate_python(content, timeout),
        _ => ValidationResult::Valid,
    }
}

fn validate_json(content: &str) -> ValidationResult {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(_) => ValidationResult::Valid,
        Err(e) => ValidationResult::Invalid(format!("JSON parse error: {e}")),
    }
}

fn validate_python(content: &str, timeout: Duration) -> ValidationResult {
    let Ok(python) = which::which("python3").or_else(|_| which::which("python")) else {
        return ValidationResult::Valid;
    };
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return ValidationResult::Valid;
    };
    if file.write_all(content.as_bytes()).is_err() {
        return ValidationResult::Valid;
    }
    let script = format!(
        "compile(open({:?}).read(), {:?}, 'exec')",
        file.path(),
        file.path()
    );
    run_checker(&python, &["-c", &script], timeout)
}

fn validate_with_checker(content: &str, language: &str, timeout: Duration) -> ValidationResult {
    let checker = match language {
        "typescript" => which::which("tsc"),
        "javascript" => which::which("eslint"),
        _ => return ValidationResult::Valid,
    };
    let Ok(checker) = checker else {
        return ValidationResult::Valid;
    };
    let ext = if language == "typescript" { "ts" } else { "js" };
    let Ok(dir) = tempfile::Builder::new().prefix("autoclaude-validate-").tempdir() else {
        return ValidationResult::Valid;
    };
    let path = dir.path().join(format!("candidate.{ext}"));
    if std::fs::write(&path, content).is_err() {
        return ValidationResult::Valid;
    }

    let args: Vec<&str> = match language {
        "typescript" => vec!["--noEmit", path.to_str().unwrap_or_default()],
        _ => vec![path.to_str().unwrap_or_default()],
    };
    run_checker(&checker, &args, timeout)
}

fn run_checker(checker: &Path, args: &[&str], timeout: Duration) -> ValidationResult {
    let mut child = match std::process::Command::new(checker)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(_) => return ValidationResult::Valid,
    };

    match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            if status.success() {
                ValidationResult::Valid
            } else {
                let mut stderr = String::new();
                if let Some(mut s) = child.stderr.take() {
                    use std::io::Read;
                    let _ = s.read_to_string(&mut stderr);
                }
                // Linter warnings are not failures; only treat this as invalid
                // when the checker reports something resembling a parse/syntax error.
                if stderr.to_lowercase().contains("syntax") || stderr.to_lowercase().contains("parse") {
                    ValidationResult::Invalid(stderr.trim().to_string())
                } else {
                    ValidationResult::Valid
                }
            }
        }
        Ok(None) => {
            let _ = child.kill();
            ValidationResult::Valid
        }
        Err(_) => ValidationResult::Valid,
    }
}
