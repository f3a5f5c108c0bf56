use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capability::{AvailabilityChecker, Capability};

pub const NO_OUTPUT_SENTINEL: &str = "[NO OUTPUT]";
pub const FAILED_SENTINEL: &str = "[FAILED]";

/// The opaque thing a probe runs. The engine never interprets its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Spawn `program` with `args` directly, without a shell.
    Exec { program: String, args: Vec<String> },
    /// Run a script through `sh -c` (pipelines, globs, redirections).
    Shell(String),
    /// Read a text file in-process.
    ReadFile(PathBuf),
}

impl Operation {
    pub fn exec(program: &str, args: &[&str]) -> Self {
        Self::Exec {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn shell(script: impl Into<String>) -> Self {
        Self::Shell(script.into())
    }

    pub fn read_file(path: impl Into<PathBuf>) -> Self {
        Self::ReadFile(path.into())
    }

    /// Literal text shown on the report's `Command:` line.
    pub fn display_text(&self) -> String {
        match self {
            Self::Exec { program, args } => {
                let mut text = program.clone();
                for arg in args {
                    text.push(' ');
                    text.push_str(arg);
                }
                text
            }
            Self::Shell(script) => script.clone(),
            Self::ReadFile(path) => format!("cat {}", path.display()),
        }
    }
}

/// Gate checked immediately before a probe would run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub check: PreconditionCheck,
    /// Rendered as `[NOT AVAILABLE - <reason>]` when the gate is closed.
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionCheck {
    Requires(Capability),
    AllOf(Vec<Capability>),
    /// Satisfied when any one source is present.
    AnyOf(Vec<Capability>),
}

impl Precondition {
    pub fn requires(capability: Capability, reason: impl Into<String>) -> Self {
        Self {
            check: PreconditionCheck::Requires(capability),
            reason: reason.into(),
        }
    }

    pub fn all_of(capabilities: Vec<Capability>, reason: impl Into<String>) -> Self {
        Self {
            check: PreconditionCheck::AllOf(capabilities),
            reason: reason.into(),
        }
    }

    pub fn any_of(capabilities: Vec<Capability>, reason: impl Into<String>) -> Self {
        Self {
            check: PreconditionCheck::AnyOf(capabilities),
            reason: reason.into(),
        }
    }

    pub fn is_satisfied(&self, checker: &dyn AvailabilityChecker) -> bool {
        match &self.check {
            PreconditionCheck::Requires(capability) => checker.is_available(capability),
            PreconditionCheck::AllOf(capabilities) => capabilities
                .iter()
                .all(|capability| checker.is_available(capability)),
            PreconditionCheck::AnyOf(capabilities) => capabilities
                .iter()
                .any(|capability| checker.is_available(capability)),
        }
    }

    pub fn capabilities(&self) -> &[Capability] {
        match &self.check {
            PreconditionCheck::Requires(capability) => std::slice::from_ref(capability),
            PreconditionCheck::AllOf(capabilities) | PreconditionCheck::AnyOf(capabilities) => {
                capabilities
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDefinition {
    pub description: String,
    pub operation: Operation,
    pub precondition: Option<Precondition>,
}

impl ProbeDefinition {
    pub fn new(description: impl Into<String>, operation: Operation) -> Self {
        Self {
            description: description.into(),
            operation,
            precondition: None,
        }
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    /// Shorthand for "needs this command on PATH".
    pub fn requires_command(self, program: &str) -> Self {
        let reason = format!("{program} not installed");
        self.when(Precondition::requires(Capability::command(program), reason))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeGroup {
    pub title: String,
    pub probes: Vec<ProbeDefinition>,
}

impl ProbeGroup {
    pub fn new(title: impl Into<String>, probes: Vec<ProbeDefinition>) -> Self {
        Self {
            title: title.into(),
            probes,
        }
    }
}

pub fn declared_probe_count(groups: &[ProbeGroup]) -> usize {
    groups.iter().map(|group| group.probes.len()).sum()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Exit success. Empty output is stored as [`NO_OUTPUT_SENTINEL`].
    Success(String),
    /// Non-zero exit, abnormal termination or invocation fault. `output` is
    /// whatever was captured, possibly empty.
    Failure {
        output: String,
        exit_code: Option<i32>,
    },
    Unavailable(String),
}

impl ProbeOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::Failure { .. } => OutcomeKind::Failure,
            Self::Unavailable(_) => OutcomeKind::Unavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub description: String,
    pub operation_text: String,
    pub outcome: ProbeOutcome,
}
