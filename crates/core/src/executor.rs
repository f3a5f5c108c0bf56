use std::fs;
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::capability::AvailabilityChecker;
use crate::probe::{Operation, ProbeDefinition, ProbeOutcome, ProbeResult, NO_OUTPUT_SENTINEL};

/// Runs single probes. Holds no state between calls.
pub struct ProbeExecutor<'a> {
    checker: &'a dyn AvailabilityChecker,
}

struct Captured {
    text: String,
    success: bool,
    exit_code: Option<i32>,
}

impl<'a> ProbeExecutor<'a> {
    pub fn new(checker: &'a dyn AvailabilityChecker) -> Self {
        Self { checker }
    }

    /// Always returns exactly one result; nothing raised by the operation
    /// escapes this call.
    pub fn run(&self, probe: &ProbeDefinition) -> ProbeResult {
        let operation_text = probe.operation.display_text();

        if let Some(precondition) = &probe.precondition {
            if !precondition.is_satisfied(self.checker) {
                debug!(
                    probe = %probe.description,
                    reason = %precondition.reason,
                    "precondition not met; skipping"
                );
                return ProbeResult {
                    description: probe.description.clone(),
                    operation_text,
                    outcome: ProbeOutcome::Unavailable(precondition.reason.clone()),
                };
            }
        }

        debug!(probe = %probe.description, command = %operation_text, "running probe");
        let outcome = match invoke(&probe.operation) {
            Ok(captured) => classify(captured),
            Err(err) => {
                warn!(probe = %probe.description, error = %err, "probe invocation failed");
                ProbeOutcome::Failure {
                    output: format!("{err:#}"),
                    exit_code: None,
                }
            }
        };

        ProbeResult {
            description: probe.description.clone(),
            operation_text,
            outcome,
        }
    }
}

fn classify(captured: Captured) -> ProbeOutcome {
    if captured.success {
        if captured.text.trim().is_empty() {
            ProbeOutcome::Success(NO_OUTPUT_SENTINEL.to_string())
        } else {
            ProbeOutcome::Success(captured.text)
        }
    } else {
        ProbeOutcome::Failure {
            output: captured.text,
            exit_code: captured.exit_code,
        }
    }
}

fn invoke(operation: &Operation) -> Result<Captured> {
    match operation {
        Operation::Exec { program, args } => {
            let resolved =
                which::which(program).with_context(|| format!("failed to execute {program}"))?;
            // The shell only wires stderr onto stdout; argv reaches the program untouched.
            let output = Command::new("sh")
                .arg("-c")
                .arg(r#"exec "$0" "$@" 2>&1"#)
                .arg(&resolved)
                .args(args)
                .stdin(Stdio::null())
                .output()
                .with_context(|| format!("failed to execute {program}"))?;
            Ok(captured_from_output(output))
        }
        Operation::Shell(script) => {
            // Redirect inside the shell so both streams interleave in order.
            let output = Command::new("sh")
                .arg("-c")
                .arg(format!("exec 2>&1\n{script}"))
                .stdin(Stdio::null())
                .output()
                .context("failed to execute sh")?;
            Ok(captured_from_output(output))
        }
        Operation::ReadFile(path) => {
            let bytes =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Captured {
                text: trim_trailing_newlines(&String::from_utf8_lossy(&bytes)),
                success: true,
                exit_code: Some(0),
            })
        }
    }
}

fn captured_from_output(output: Output) -> Captured {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let merged = match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr.trim_end()),
        (false, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (true, true) => String::new(),
    };

    Captured {
        text: trim_trailing_newlines(&merged),
        success: output.status.success(),
        exit_code: output.status.code(),
    }
}

fn trim_trailing_newlines(text: &str) -> String {
    text.trim_end_matches(&['\n', '\r'][..]).to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::HashSet;
    use std::fs;

    use super::ProbeExecutor;
    use crate::capability::{AvailabilityChecker, Capability};
    use crate::probe::{Operation, Precondition, ProbeDefinition, ProbeOutcome};

    struct Present(HashSet<Capability>);

    impl AvailabilityChecker for Present {
        fn is_available(&self, capability: &Capability) -> bool {
            self.0.contains(capability)
        }
    }

    fn nothing_present() -> Present {
        Present(HashSet::new())
    }

    #[test]
    fn successful_output_is_captured_verbatim() {
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);
        let result = executor.run(&ProbeDefinition::new(
            "Kernel info",
            Operation::exec("echo", &["Linux 6.1.0"]),
        ));

        assert_eq!(result.description, "Kernel info");
        assert_eq!(result.operation_text, "echo Linux 6.1.0");
        assert_eq!(result.outcome, ProbeOutcome::Success("Linux 6.1.0".to_string()));
    }

    #[test]
    fn empty_success_becomes_no_output_sentinel() {
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);
        let result = executor.run(&ProbeDefinition::new("quiet", Operation::exec("true", &[])));
        assert_eq!(result.outcome, ProbeOutcome::Success("[NO OUTPUT]".to_string()));
    }

    #[test]
    fn non_zero_exit_is_failure_with_merged_streams() {
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);
        let result = executor.run(&ProbeDefinition::new(
            "noisy failure",
            Operation::shell("echo partial; echo 'device busy' >&2; exit 3"),
        ));

        assert_eq!(
            result.outcome,
            ProbeOutcome::Failure {
                output: "partial\ndevice busy".to_string(),
                exit_code: Some(3),
            }
        );
    }

    #[test]
    fn exec_streams_interleave_in_emission_order() {
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);
        let result = executor.run(&ProbeDefinition::new(
            "interleaved",
            Operation::exec(
                "sh",
                &["-c", "echo 'Device /dev/video9:'; echo 'cannot open' >&2; echo done; exit 1"],
            ),
        ));

        assert_eq!(
            result.outcome,
            ProbeOutcome::Failure {
                output: "Device /dev/video9:\ncannot open\ndone".to_string(),
                exit_code: Some(1),
            }
        );
    }

    #[test]
    fn exec_arguments_are_not_reparsed_by_the_shell() {
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);
        let result = executor.run(&ProbeDefinition::new(
            "literal",
            Operation::exec("echo", &["$HOME; echo injected"]),
        ));
        assert_eq!(
            result.outcome,
            ProbeOutcome::Success("$HOME; echo injected".to_string())
        );
    }

    #[test]
    fn silent_failure_keeps_empty_output() {
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);
        let result = executor.run(&ProbeDefinition::new("false", Operation::exec("false", &[])));
        assert_eq!(
            result.outcome,
            ProbeOutcome::Failure {
                output: String::new(),
                exit_code: Some(1),
            }
        );
    }

    #[test]
    fn missing_binary_is_failure_not_panic() {
        let checker = Present(HashSet::from([Capability::command(
            "cam-diag-definitely-missing",
        )]));
        let executor = ProbeExecutor::new(&checker);
        let probe = ProbeDefinition::new(
            "ghost tool",
            Operation::exec("cam-diag-definitely-missing", &["--version"]),
        )
        .requires_command("cam-diag-definitely-missing");

        match executor.run(&probe).outcome {
            ProbeOutcome::Failure { output, exit_code } => {
                assert!(output.contains("failed to execute cam-diag-definitely-missing"));
                assert_eq!(exit_code, None);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn closed_gate_never_invokes_operation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("ran");
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);
        let probe = ProbeDefinition::new(
            "Pi model",
            Operation::shell(format!("touch {}", marker.display())),
        )
        .when(Precondition::requires(
            Capability::file("/proc/device-tree/model"),
            "Not a Raspberry Pi or file missing",
        ));

        let result = executor.run(&probe);
        assert_eq!(
            result.outcome,
            ProbeOutcome::Unavailable("Not a Raspberry Pi or file missing".to_string())
        );
        assert!(!marker.exists());
    }

    #[test]
    fn read_file_operation_reads_contents_and_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("config.txt");
        fs::write(&config, "camera_auto_detect=1\n").expect("write config");
        let checker = nothing_present();
        let executor = ProbeExecutor::new(&checker);

        let read = executor.run(&ProbeDefinition::new(
            "config",
            Operation::read_file(&config),
        ));
        assert_eq!(
            read.outcome,
            ProbeOutcome::Success("camera_auto_detect=1".to_string())
        );

        let missing = executor.run(&ProbeDefinition::new(
            "config",
            Operation::read_file(dir.path().join("absent.txt")),
        ));
        assert!(matches!(missing.outcome, ProbeOutcome::Failure { .. }));
    }
}
