//! End-to-end checks of the `gpiotrigger` binary against fake sysfs trees

mod common;

use anyhow::Result;
use common::TriggerCommand;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// Sysfs tree with the control files present but no lines exported
fn empty_sysfs() -> Result<TempDir> {
    let root = TempDir::new()?;
    fs::write(root.path().join("export"), "")?;
    fs::write(root.path().join("unexport"), "")?;
    Ok(root)
}

#[test]
fn test_help_lists_flags() -> Result<()> {
    let result = TriggerCommand::new().args(&["--help"]).assert_success()?;

    for flag in ["--command", "--time", "--pin", "--config", "--sysfs-root", "--verbose"] {
        assert!(result.contains_stdout(flag), "missing {} in help", flag);
    }
    assert!(!result.contains_stdout("--tick-ms"));
    Ok(())
}

#[test]
fn test_already_exported_pin_fails_without_writes() -> Result<()> {
    let root = empty_sysfs()?;
    let line_dir = root.path().join("gpio17");
    fs::create_dir(&line_dir)?;
    fs::write(line_dir.join("value"), "1\n")?;

    let result = TriggerCommand::new()
        .sysfs_root(root.path())
        .args(&["--pin", "17"])
        .timeout(Duration::from_secs(10))
        .assert_failure()?;

    assert!(result.contains_stderr("gpio17 already exported"));
    assert!(!result.contains_stdout("hello, world"));
    assert_eq!(fs::read_to_string(root.path().join("export"))?, "");
    assert_eq!(fs::read_to_string(root.path().join("unexport"))?, "");
    assert!(!line_dir.join("direction").exists());
    Ok(())
}

#[test]
fn test_missing_sysfs_root_fails() -> Result<()> {
    let root = TempDir::new()?;
    let result = TriggerCommand::new()
        .sysfs_root(root.path().join("missing"))
        .timeout(Duration::from_secs(10))
        .assert_failure()?;

    assert!(result.contains_stderr("Failed to open gpio27"));
    Ok(())
}

#[test]
fn test_export_that_never_appears_fails() -> Result<()> {
    let root = empty_sysfs()?;

    let result = TriggerCommand::new()
        .sysfs_root(root.path())
        .args(&["-p", "4"])
        .timeout(Duration::from_secs(10))
        .assert_failure()?;

    assert!(result.contains_stderr("gpio4 did not appear"));
    assert_eq!(fs::read_to_string(root.path().join("export"))?, "4");
    Ok(())
}

#[test]
fn test_invalid_config_rejected() -> Result<()> {
    let root = empty_sysfs()?;
    let config = root.path().join("gpiotrigger.toml");
    fs::write(&config, "tick_ms = 0\n")?;

    let result = TriggerCommand::new()
        .args(&["--config", &config.display().to_string()])
        .assert_failure()?;

    assert!(result.contains_stderr("tick_ms must be between"));
    // Rejected before touching sysfs
    assert_eq!(fs::read_to_string(root.path().join("export"))?, "");
    Ok(())
}

#[test]
fn test_malformed_config_rejected() -> Result<()> {
    let root = TempDir::new()?;
    let config = root.path().join("gpiotrigger.toml");
    fs::write(&config, "pin = \"seventeen\"\n")?;

    let result = TriggerCommand::new()
        .args(&["--config", &config.display().to_string()])
        .assert_failure()?;

    assert!(result.contains_stderr("Invalid config"));
    Ok(())
}

#[test]
fn test_flag_overrides_invalid_config_value() -> Result<()> {
    let root = empty_sysfs()?;
    let config = root.path().join("gpiotrigger.toml");
    fs::write(&config, "time = 100000\n")?;

    // The flag replaces the out-of-range value, so the run gets as far as export
    let result = TriggerCommand::new()
        .sysfs_root(root.path())
        .args(&["--config", &config.display().to_string(), "--time", "2"])
        .timeout(Duration::from_secs(10))
        .assert_failure()?;

    assert!(!result.contains_stderr("time must be"));
    assert!(result.contains_stderr("did not appear"));
    Ok(())
}
