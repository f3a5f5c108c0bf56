use crate::identity::RunIdentity;
use crate::probe::{ProbeOutcome, ProbeResult, FAILED_SENTINEL};

pub const DEFAULT_WIDTH: usize = 80;
pub const DEFAULT_TITLE: &str = "CAMERA DIAGNOSTIC INFORMATION";
pub const END_MARKER: &str = "END OF DIAGNOSTIC INFORMATION";

/// Fixed text layout of the report. Every piece ends with a newline so the
/// pieces can be appended to a sink one at a time.
#[derive(Debug, Clone)]
pub struct Layout {
    pub width: usize,
    pub title: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

impl Layout {
    pub fn delimiter(&self) -> String {
        "=".repeat(self.width)
    }

    pub fn header(&self, identity: &RunIdentity, generated_at: &str) -> String {
        let delimiter = self.delimiter();
        let mut out = String::new();
        out.push_str(&format!("{delimiter}\n"));
        out.push_str(&format!("{}\n", centered(&self.title, self.width)));
        out.push_str(&format!("{delimiter}\n\n"));
        out.push_str(&format!("Generated: {generated_at}\n"));
        out.push_str(&format!("Hostname: {}\n", identity.hostname));
        out.push_str(&format!("User: {}\n\n", identity.user));
        out.push_str(&format!("Target Device: {}\n\n", identity.target));
        out.push_str(&format!("{delimiter}\n"));
        out
    }

    pub fn section(&self, title: &str) -> String {
        let delimiter = self.delimiter();
        format!("\n{delimiter}\n  {title}\n{delimiter}\n\n")
    }

    pub fn footer(&self, invocation: &str, finished_at: &str) -> String {
        let delimiter = self.delimiter();
        format!(
            "\n{delimiter}\n{END_MARKER}\n{delimiter}\n\nGenerated by: {invocation}\nDate: {finished_at}\n"
        )
    }
}

pub fn subsection(result: &ProbeResult) -> String {
    format!(
        "\n--- {} ---\n\nCommand: {}\n\n{}\n",
        result.description,
        result.operation_text,
        outcome_body(&result.outcome)
    )
}

fn outcome_body(outcome: &ProbeOutcome) -> String {
    match outcome {
        ProbeOutcome::Success(output) => output.clone(),
        ProbeOutcome::Failure { output, .. } if output.trim().is_empty() => {
            FAILED_SENTINEL.to_string()
        }
        ProbeOutcome::Failure { output, .. } => {
            format!("{FAILED_SENTINEL}\n\nError output:\n{output}")
        }
        ProbeOutcome::Unavailable(reason) => format!("[NOT AVAILABLE - {reason}]"),
    }
}

fn centered(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{}{}", " ".repeat((width - len) / 2), text)
}
