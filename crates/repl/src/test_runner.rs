//! Directive test runner
//!
//! Discovers `*.jpl` test files and checks their embedded expectations. A
//! test file carries directives as trailing comments:
//!
//! ```text
//! print 1 + 2;    //stdout: 3
//! missing;        //stderrre: ReferenceError.*
//! //stdin: first line of the child's standard input
//! ```
//!
//! Each file is executed by spawning the `japl` binary itself with the
//! source piped in, followed by an EOT byte and the joined `//stdin:`
//! payload. Captured stdout/stderr are stripped of configured substrings
//! and compared line by line: exact for `//stdout:`/`//stderr:`, regex
//! for the `re` variants. One trailing empty observed line is tolerated.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use regex::Regex;

/// One expected output line.
#[derive(Debug)]
enum Expectation {
    Exact(String),
    Pattern(Regex),
}

impl Expectation {
    fn matches(&self, line: &str) -> bool {
        match self {
            Expectation::Exact(expected) => expected == line,
            Expectation::Pattern(regex) => regex.is_match(line),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Exact(expected) => write!(f, "'{}'", expected),
            Expectation::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// Expectations embedded in one test file.
#[derive(Debug, Default)]
struct Directives {
    stdout: Vec<Expectation>,
    stderr: Vec<Expectation>,
    stdin: Vec<String>,
}

/// Payload of a directive found anywhere in `line`, with one leading
/// space after the marker stripped.
fn directive_payload<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let position = line.find(marker)?;
    let payload = &line[position + marker.len()..];
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

fn parse_directives(source: &str) -> Result<Directives, String> {
    let mut directives = Directives::default();
    for line in source.lines() {
        if let Some(payload) = directive_payload(line, "//stdout:") {
            directives.stdout.push(Expectation::Exact(payload.to_string()));
        } else if let Some(payload) = directive_payload(line, "//stderr:") {
            directives.stderr.push(Expectation::Exact(payload.to_string()));
        } else if let Some(payload) = directive_payload(line, "//stdoutre:") {
            let regex = Regex::new(payload)
                .map_err(|error| format!("bad //stdoutre: pattern: {}", error))?;
            directives.stdout.push(Expectation::Pattern(regex));
        } else if let Some(payload) = directive_payload(line, "//stderrre:") {
            let regex = Regex::new(payload)
                .map_err(|error| format!("bad //stderrre: pattern: {}", error))?;
            directives.stderr.push(Expectation::Pattern(regex));
        } else if let Some(payload) = directive_payload(line, "//stdin:") {
            directives.stdin.push(payload.to_string());
        }
    }
    Ok(directives)
}

/// Result of running one test file.
#[derive(Debug)]
pub struct TestOutcome {
    pub path: PathBuf,
    pub failures: Vec<String>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Summary across all discovered files.
#[derive(Debug, Default)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub outcomes: Vec<TestOutcome>,
}

/// Test runner configuration.
#[derive(Debug, Default)]
pub struct TestRunner {
    /// Substrings removed from observed output before comparison.
    pub strip: Vec<String>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find `*.jpl` files under the given paths, sorted.
    pub fn discover(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                self.discover_in_directory(path, &mut files);
            } else if path.exists() {
                files.push(path.clone());
            } else {
                eprintln!("Warning: {} does not exist", path.display());
            }
        }
        files.sort();
        files
    }

    fn discover_in_directory(&self, dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    self.discover_in_directory(&path, files);
                } else if path.extension().is_some_and(|ext| ext == "jpl") {
                    files.push(path);
                }
            }
        }
    }

    pub fn run(&self, paths: &[PathBuf]) -> TestSummary {
        let mut summary = TestSummary::default();
        for path in self.discover(paths) {
            let outcome = self.run_file(&path);
            summary.total += 1;
            if outcome.passed() {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
            summary.outcomes.push(outcome);
        }
        summary
    }

    fn run_file(&self, path: &Path) -> TestOutcome {
        let mut failures = Vec::new();

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                return TestOutcome {
                    path: path.to_path_buf(),
                    failures: vec![format!("failed to read file: {}", error)],
                };
            }
        };

        let directives = match parse_directives(&source) {
            Ok(directives) => directives,
            Err(error) => {
                return TestOutcome {
                    path: path.to_path_buf(),
                    failures: vec![error],
                };
            }
        };

        match self.spawn_child(&source, &directives.stdin) {
            Ok((stdout, stderr)) => {
                self.check_stream("stdout", &stdout, &directives.stdout, &mut failures);
                self.check_stream("stderr", &stderr, &directives.stderr, &mut failures);
            }
            Err(error) => failures.push(error),
        }

        TestOutcome {
            path: path.to_path_buf(),
            failures,
        }
    }

    /// Run the `japl` binary with the embedded-protocol payload on stdin.
    fn spawn_child(&self, source: &str, stdin_lines: &[String]) -> Result<(String, String), String> {
        let exe = std::env::current_exe()
            .map_err(|error| format!("cannot locate interpreter binary: {}", error))?;

        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| format!("failed to spawn interpreter: {}", error))?;

        let mut payload = source.as_bytes().to_vec();
        payload.push(0x04);
        payload.extend_from_slice(stdin_lines.join("\n").as_bytes());

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|error| format!("failed to write test input: {}", error))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|error| format!("failed to run test: {}", error))?;
        Ok((
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    fn check_stream(
        &self,
        name: &str,
        observed: &str,
        expected: &[Expectation],
        failures: &mut Vec<String>,
    ) {
        let mut lines: Vec<String> = observed
            .lines()
            .map(|line| {
                let mut line = line.to_string();
                for strip in &self.strip {
                    line = line.replace(strip.as_str(), "");
                }
                line
            })
            .collect();

        // Tolerate one trailing empty line in observed output.
        if lines.len() == expected.len() + 1 && lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }

        if lines.len() != expected.len() {
            failures.push(format!(
                "{}: expected {} line(s), got {}",
                name,
                expected.len(),
                lines.len()
            ));
            return;
        }

        for (index, (line, expectation)) in lines.iter().zip(expected).enumerate() {
            if !expectation.matches(line) {
                failures.push(format!(
                    "{} line {}: expected {}, got '{}'",
                    name,
                    index + 1,
                    expectation,
                    line
                ));
            }
        }
    }

    pub fn print_results(&self, summary: &TestSummary) {
        for outcome in &summary.outcomes {
            let status = if outcome.passed() { "ok" } else { "FAILED" };
            println!("{} ... {}", outcome.path.display(), status);
        }

        println!("\n========================================");
        println!(
            "Results: {} passed, {} failed",
            summary.passed, summary.failed
        );

        let failures: Vec<_> = summary
            .outcomes
            .iter()
            .filter(|outcome| !outcome.passed())
            .collect();
        if !failures.is_empty() {
            println!("\nFAILURES:\n");
            for outcome in failures {
                println!("{}", outcome.path.display());
                for failure in &outcome.failures {
                    println!("  {}", failure);
                }
                println!();
            }
        }
    }
}

/// Entry point for `japl --test PATH...`.
pub fn run_paths(paths: &[PathBuf]) -> i32 {
    let runner = TestRunner::new();
    let summary = runner.run(paths);
    runner.print_results(&summary);

    if summary.failed > 0 {
        1
    } else if summary.total == 0 {
        eprintln!("No tests found");
        2
    } else {
        0
    }
}
