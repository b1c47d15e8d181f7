//! Integration tests for CLI commands that need no cluster

use std::process::Command;

/// certsync command with a clean CERTSYNC_* environment
fn certsync_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_certsync"));
    for (key, _) in std::env::vars() {
        if key.starts_with("CERTSYNC_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

/// Helper to run certsync command
fn certsync(args: &[&str]) -> std::process::Output {
    certsync_command()
        .args(args)
        .output()
        .expect("Failed to execute certsync")
}

mod help {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = certsync(&["--help"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("run"));
        assert!(stdout.contains("status"));
        assert!(stdout.contains("config"));
    }

    #[test]
    fn test_unknown_command_fails() {
        let output = certsync(&["rotate-everything"]);
        assert!(!output.status.success());
    }
}

mod config_command {
    use super::*;

    #[test]
    fn test_default_config() {
        let output = certsync(&["config"]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("secretNameAnnotation: certsync.io/secret-name"));
        assert!(stdout.contains("renewalWindow: 1day"));
        assert!(!stdout.contains("namespace:"));
    }

    #[test]
    fn test_config_file_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certsync.yaml");
        std::fs::write(&path, "renewalWindow: 48h\nerrorRequeue: 1m\n").unwrap();

        let output = certsync(&[
            "config",
            "--config",
            path.to_str().unwrap(),
            "--namespace",
            "webhooks",
        ]);

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("renewalWindow: 2days"));
        assert!(stdout.contains("errorRequeue: 1m"));
        assert!(stdout.contains("namespace: webhooks"));
    }

    #[test]
    fn test_env_fallback() {
        let output = certsync_command()
            .args(["config"])
            .env("CERTSYNC_RENEWAL_WINDOW", "12h")
            .output()
            .expect("Failed to execute certsync");

        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("renewalWindow: 12h"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certsync.yaml");
        std::fs::write(&path, "renewalWindow: 10d\ncertificateValidity: 5d\n").unwrap();

        let output = certsync(&["config", "--config", path.to_str().unwrap()]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("certificateValidity"));
    }

    #[test]
    fn test_bad_duration_flag_is_usage_error() {
        let output = certsync(&["config", "--renewal-window", "soon"]);

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("invalid duration"));
    }

    #[test]
    fn test_logs_go_to_stderr_in_requested_format() {
        let output = certsync_command()
            .args(["--log-format", "json", "config"])
            .env("RUST_LOG", "debug")
            .output()
            .expect("Failed to execute certsync");

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stdout.starts_with("secretNameAnnotation:"));
        let line = stderr
            .lines()
            .find(|l| l.contains("Resolved configuration"))
            .expect("config command should log at debug level");
        assert!(line.starts_with('{'));
    }

    #[test]
    fn test_missing_config_file() {
        let output = certsync(&["config", "--config", "/nonexistent/certsync.yaml"]);
        assert_eq!(output.status.code(), Some(5));
    }
}
