//! Denylist scan for generated code.
//!
//! Generated code is untrusted. There is no sandbox beyond the subprocess
//! boundary, so before anything is written to disk or spawned the code is
//! checked against a fixed set of patterns. Any hit rejects the code outright.

/// A dangerous construct the scanner looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerousPattern {
    /// `rm -rf /...`
    RecursiveRootDelete,
    /// `:(){ :|:& };:`
    ForkBomb,
    /// `eval(`
    Eval,
    /// `Function(` constructor
    FunctionConstructor,
    /// `child_process.spawn`
    ProcessSpawn,
}

impl std::fmt::Display for DangerousPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DangerousPattern::RecursiveRootDelete => write!(f, "recursive root deletion (rm -rf /)"),
            DangerousPattern::ForkBomb => write!(f, "fork bomb"),
            DangerousPattern::Eval => write!(f, "dynamic evaluation (eval)"),
            DangerousPattern::FunctionConstructor => write!(f, "dynamic evaluation (Function constructor)"),
            DangerousPattern::ProcessSpawn => write!(f, "process spawn (child_process.spawn)"),
        }
    }
}

/// Return the first dangerous pattern found in `code`, if any.
pub fn scan(code: &str) -> Option<DangerousPattern> {
    if contains_recursive_root_delete(code) {
        return Some(DangerousPattern::RecursiveRootDelete);
    }
    if contains_fork_bomb(code) {
        return Some(DangerousPattern::ForkBomb);
    }
    if code.contains("eval(") {
        return Some(DangerousPattern::Eval);
    }
    if code.contains("Function(") {
        return Some(DangerousPattern::FunctionConstructor);
    }
    if code.contains("child_process.spawn") {
        return Some(DangerousPattern::ProcessSpawn);
    }
    None
}

/// Matches `rm`, whitespace, `-rf`, whitespace, `/`.
fn contains_recursive_root_delete(code: &str) -> bool {
    code.match_indices("rm").any(|(idx, _)| {
        let rest = &code[idx + 2..];
        let Some(rest) = strip_required_whitespace(rest) else {
            return false;
        };
        let Some(rest) = rest.strip_prefix("-rf") else {
            return false;
        };
        strip_required_whitespace(rest).is_some_and(|r| r.starts_with('/'))
    })
}

/// Strip at least one leading whitespace character.
fn strip_required_whitespace(s: &str) -> Option<&str> {
    let trimmed = s.trim_start();
    (trimmed.len() < s.len()).then_some(trimmed)
}

/// Matches the classic bash fork bomb regardless of spacing.
fn contains_fork_bomb(code: &str) -> bool {
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains(":(){:|:&};:") || compact.contains(":(){|:&};:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_rm_rf_root() {
        assert_eq!(scan("rm -rf /"), Some(DangerousPattern::RecursiveRootDelete));
        assert_eq!(
            scan("echo hi && rm   -rf\t/home/user"),
            Some(DangerousPattern::RecursiveRootDelete)
        );
    }

    #[test]
    fn allows_relative_rm() {
        assert_eq!(scan("rm -rf ./build"), None);
        assert_eq!(scan("rm -rf build/"), None);
        assert_eq!(scan("npm run format"), None);
    }

    #[test]
    fn detects_fork_bomb_with_and_without_spaces() {
        assert_eq!(scan(":(){ :|:& };:"), Some(DangerousPattern::ForkBomb));
        assert_eq!(scan(":(){|:&};:"), Some(DangerousPattern::ForkBomb));
    }

    #[test]
    fn detects_dynamic_evaluation() {
        assert_eq!(scan("const x = eval('1+1');"), Some(DangerousPattern::Eval));
        assert_eq!(
            scan("new Function('return 1')()"),
            Some(DangerousPattern::FunctionConstructor)
        );
    }

    #[test]
    fn detects_process_spawn() {
        let code = "const cp = require('child_process');\ncp.exec('ls');\nchild_process.spawn('sh');";
        assert_eq!(scan(code), Some(DangerousPattern::ProcessSpawn));
    }

    #[test]
    fn clean_code_passes() {
        let code = "const fs = require('fs');\nconsole.log(fs.readdirSync('.').length);";
        assert_eq!(scan(code), None);
    }
}
