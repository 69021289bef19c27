//! Preflight checks for build validation.
//!
//! Validates that the host has the tools the pipeline shells out to before
//! starting a multi-hour build. This prevents cryptic errors deep in the
//! install phase.

use anyhow::{bail, Result};

/// Tools the pipeline shells out to, with the package that provides them.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("make", "base system"),
    ("sudo", "security/sudo"),
    ("mdconfig", "base system"),
    ("mount", "base system"),
    ("umount", "base system"),
];

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// Reports all missing tools at once rather than failing on the first.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let mut missing = Vec::new();

    for (tool, package) in tools {
        if !command_exists(tool) {
            missing.push(format!("  {} (install: {})", tool, package));
        }
    }

    if !missing.is_empty() {
        bail!("Missing required host tools:\n{}", missing.join("\n"));
    }

    Ok(())
}

/// Check that all tools in [`REQUIRED_TOOLS`] are available.
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("ls", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_lists_all_missing() {
        let tools = &[
            ("nonexistent_tool_one", "pkg-one"),
            ("ls", "coreutils"),
            ("nonexistent_tool_two", "pkg-two"),
        ];
        let err = check_required_tools(tools).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nonexistent_tool_one"));
        assert!(msg.contains("nonexistent_tool_two"));
        assert!(msg.contains("pkg-two"));
    }
}
