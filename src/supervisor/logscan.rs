//! Log-tail heuristics for startup validation.
//!
//! A keyword hit in the tail of a fresh log is a warning; a hit that also
//! matches one of the critical patterns fails the start. Both keyword tables
//! are configuration, not code.

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

/// Tunable classification policy for the log scan step.
#[derive(Debug, Clone, Deserialize)]
pub struct LogScanPolicy {
    /// How many lines from the end of the log to inspect
    pub tail_lines: usize,
    /// Case-insensitive keywords that flag a line at all
    pub keywords: Vec<String>,
    /// Glob patterns (`*` wildcard) that escalate a flagged line to critical
    pub critical_patterns: Vec<String>,
}

impl Default for LogScanPolicy {
    fn default() -> Self {
        Self {
            tail_lines: 30,
            keywords: [
                "error",
                "exception",
                "failed",
                "traceback",
                "fatal",
                "critical",
            ]
            .map(str::to_string)
            .to_vec(),
            critical_patterns: [
                "connection*failed",
                "database*error",
                "network*error",
                "api*error",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }
}

/// Result of scanning a log tail.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Lines matching a keyword but no critical pattern
    pub warnings: Vec<String>,
    /// Lines matching a keyword and a critical pattern
    pub critical: Vec<String>,
}

impl ScanReport {
    pub fn is_critical(&self) -> bool {
        !self.critical.is_empty()
    }
}

/// Last `n` lines of a file. A missing file reads as empty: the service may
/// not have written anything yet, which is not an error.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}

/// Read everything appended after `offset`, returning the new content and
/// the offset to resume from. A file shorter than the offset is treated as
/// rotated and read from the start; a missing file reads as empty.
pub fn read_appended(path: &Path, offset: u64) -> io::Result<(String, u64)> {
    use std::io::{Read, Seek, SeekFrom};

    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((String::new(), 0)),
        Err(e) => return Err(e),
    };

    let len = file.metadata()?.len();
    let start = if len < offset { 0 } else { offset };
    file.seek(SeekFrom::Start(start))?;

    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    let next = start + buf.len() as u64;
    Ok((buf, next))
}

/// Classify log lines against the policy.
pub fn scan(policy: &LogScanPolicy, lines: &[String]) -> ScanReport {
    let mut report = ScanReport::default();

    for line in lines {
        let lower = line.to_lowercase();
        if !policy.keywords.iter().any(|k| lower.contains(k.as_str())) {
            continue;
        }
        if policy
            .critical_patterns
            .iter()
            .any(|p| glob_match(p, &lower))
        {
            report.critical.push(line.clone());
        } else {
            report.warnings.push(line.clone());
        }
    }

    report
}

/// Substring glob: `*` matches any run of characters, the pattern may match
/// anywhere in the text. Also used by the pattern-based process sweep.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let mut rest = text;

    for part in pattern.split('*') {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn connection_failed_is_critical() {
        let policy = LogScanPolicy::default();
        let report = scan(
            &policy,
            &lines(&["starting up", "ERROR: Connection failed after 3 retries"]),
        );
        assert!(report.is_critical());
        assert_eq!(report.critical.len(), 1);
    }

    #[test]
    fn plain_warning_is_not_critical() {
        let policy = LogScanPolicy::default();
        let report = scan(&policy, &lines(&["warning: slow response from upbit"]));
        // "warning" is not in the keyword set at all
        assert!(!report.is_critical());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn keyword_without_critical_pattern_is_a_warning() {
        let policy = LogScanPolicy::default();
        let report = scan(&policy, &lines(&["order failed: insufficient balance"]));
        assert!(!report.is_critical());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let policy = LogScanPolicy::default();
        let report = scan(&policy, &lines(&["FATAL: Database ERROR on startup"]));
        assert!(report.is_critical());
    }

    #[test]
    fn glob_wildcard_spans_words() {
        assert!(glob_match("connection*failed", "connection to api failed"));
        assert!(glob_match("api*error", "api returned error 500"));
        assert!(!glob_match("database*error", "database is fine"));
    }

    #[test]
    fn tail_returns_last_n_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("svc.log");
        let body: Vec<String> = (1..=50).map(|i| format!("line {i}")).collect();
        std::fs::write(&path, body.join("\n")).expect("write");

        let tail = tail_lines(&path, 30).expect("tail");
        assert_eq!(tail.len(), 30);
        assert_eq!(tail.first().map(String::as_str), Some("line 21"));
        assert_eq!(tail.last().map(String::as_str), Some("line 50"));
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tail = tail_lines(&dir.path().join("absent.log"), 30).expect("tail");
        assert!(tail.is_empty());
    }

    #[test]
    fn appended_content_is_read_from_the_offset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("svc.log");

        std::fs::write(&path, "one\n").expect("write");
        let (chunk, offset) = read_appended(&path, 0).expect("read");
        assert_eq!(chunk, "one\n");

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("open");
        use std::io::Write;
        file.write_all(b"two\n").expect("append");
        drop(file);

        let (chunk, offset) = read_appended(&path, offset).expect("read");
        assert_eq!(chunk, "two\n");

        // Rotation: the file shrank, so reading resumes from the start.
        std::fs::write(&path, "x\n").expect("truncate");
        let (chunk, _) = read_appended(&path, offset).expect("read");
        assert_eq!(chunk, "x\n");
    }
}
