use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capability::AvailabilityChecker;
use crate::error::CompileError;
use crate::executor::ProbeExecutor;
use crate::identity::{collect_run_identity, now_timestamp, RunIdentity};
use crate::probe::{declared_probe_count, OutcomeKind, ProbeGroup};
use crate::render::{subsection, Layout, DEFAULT_TITLE, DEFAULT_WIDTH};
use crate::summary::CompileSummary;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub title: String,
    pub width: usize,
    /// Device the report is about; shown in the header.
    pub target: String,
    /// Command line that produced the report; shown in the footer.
    pub invocation: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            width: DEFAULT_WIDTH,
            target: "/dev/video0".to_string(),
            invocation: "cam-diag".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    ValidatingSink,
    WritingHeader,
    WritingGroup,
    WritingFooter,
    Done,
    Aborted,
}

/// Side-channel notifications; never part of the report itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    GroupStarted {
        index: usize,
        title: String,
    },
    ProbeFinished {
        seq: usize,
        total: usize,
        description: String,
        outcome: OutcomeKind,
    },
}

pub struct ReportCompiler<'a> {
    executor: ProbeExecutor<'a>,
    layout: Layout,
    options: CompileOptions,
    state: RunState,
}

impl<'a> ReportCompiler<'a> {
    pub fn new(checker: &'a dyn AvailabilityChecker, options: CompileOptions) -> Self {
        Self {
            executor: ProbeExecutor::new(checker),
            layout: Layout {
                width: options.width,
                title: options.title.clone(),
            },
            options,
            state: RunState::NotStarted,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn compile(
        &mut self,
        groups: &[ProbeGroup],
        sink: &Path,
    ) -> Result<CompileSummary, CompileError> {
        self.compile_with_callback(groups, sink, |_| {})
    }

    pub fn compile_with_callback<F>(
        &mut self,
        groups: &[ProbeGroup],
        sink: &Path,
        on_event: F,
    ) -> Result<CompileSummary, CompileError>
    where
        F: FnMut(&ProgressEvent),
    {
        self.transition(RunState::ValidatingSink);
        let file = match validate_sink(sink) {
            Ok(file) => file,
            Err(err) => {
                self.transition(RunState::Aborted);
                return Err(err);
            }
        };

        let identity = collect_run_identity(&self.options.target);
        let mut summary = self.stream(groups, BufWriter::new(file), identity, on_event)?;
        summary.output_path = Some(sink.to_string_lossy().to_string());
        Ok(summary)
    }

    /// Streams the report into an already-validated writer. Each piece is
    /// flushed as soon as it is rendered.
    pub fn stream<W, F>(
        &mut self,
        groups: &[ProbeGroup],
        mut writer: W,
        identity: RunIdentity,
        mut on_event: F,
    ) -> Result<CompileSummary, CompileError>
    where
        W: Write,
        F: FnMut(&ProgressEvent),
    {
        let total = declared_probe_count(groups);
        let started_at = now_timestamp();
        info!(
            target_device = %identity.target,
            groups = groups.len(),
            probes = total,
            "compiling diagnostic report"
        );

        self.transition(RunState::WritingHeader);
        append(&mut writer, &self.layout.header(&identity, &started_at))?;

        let mut summary = CompileSummary::new(identity, started_at);
        let mut seq = 0;
        for (index, group) in groups.iter().enumerate() {
            self.transition(RunState::WritingGroup);
            on_event(&ProgressEvent::GroupStarted {
                index,
                title: group.title.clone(),
            });
            append(&mut writer, &self.layout.section(&group.title))?;
            summary.groups += 1;

            for probe in &group.probes {
                let result = self.executor.run(probe);
                append(&mut writer, &subsection(&result))?;

                seq += 1;
                let kind = result.outcome.kind();
                summary.record(kind);
                on_event(&ProgressEvent::ProbeFinished {
                    seq,
                    total,
                    description: result.description,
                    outcome: kind,
                });
            }
        }

        self.transition(RunState::WritingFooter);
        let finished_at = now_timestamp();
        append(
            &mut writer,
            &self.layout.footer(&self.options.invocation, &finished_at),
        )?;
        summary.finished_at = finished_at;

        self.transition(RunState::Done);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            unavailable = summary.unavailable,
            "diagnostic report complete"
        );
        Ok(summary)
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "report state");
            self.state = next;
        }
    }
}

/// Checks where a sink would go without creating anything: the parent must
/// be an existing directory and the path itself must not be one.
pub fn check_sink_location(path: &Path) -> Result<(), CompileError> {
    let unavailable = |reason: String| CompileError::SinkUnavailable {
        path: path.to_path_buf(),
        reason,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if parent.exists() && !parent.is_dir() {
        return Err(unavailable(format!("{} is not a directory", parent.display())));
    }
    if !parent.is_dir() {
        return Err(unavailable(format!(
            "directory {} does not exist",
            parent.display()
        )));
    }
    if path.is_dir() {
        return Err(unavailable("path is a directory".to_string()));
    }
    Ok(())
}

/// Precondition gate for the output location. Runs before any probe.
pub fn validate_sink(path: &Path) -> Result<File, CompileError> {
    check_sink_location(path)?;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|err| CompileError::SinkUnavailable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

fn append<W: Write>(writer: &mut W, chunk: &str) -> Result<(), CompileError> {
    writer.write_all(chunk.as_bytes())?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::{self, Write};

    use super::{validate_sink, CompileOptions, ReportCompiler, RunState};
    use crate::capability::{AvailabilityChecker, Capability};
    use crate::error::CompileError;
    use crate::identity::RunIdentity;
    use crate::probe::{Operation, ProbeDefinition, ProbeGroup};

    struct NothingPresent;

    impl AvailabilityChecker for NothingPresent {
        fn is_available(&self, _capability: &Capability) -> bool {
            false
        }
    }

    struct Present(HashSet<Capability>);

    impl AvailabilityChecker for Present {
        fn is_available(&self, capability: &Capability) -> bool {
            self.0.contains(capability)
        }
    }

    /// Accepts a fixed number of bytes, then fails every write.
    struct BrokenPipe {
        written: Vec<u8>,
        budget: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn identity() -> RunIdentity {
        RunIdentity {
            hostname: "host".to_string(),
            user: "user".to_string(),
            target: "/dev/video0".to_string(),
        }
    }

    fn gated_group() -> Vec<ProbeGroup> {
        vec![ProbeGroup::new(
            "MODULES",
            vec![
                ProbeDefinition::new("vivid info", Operation::exec("modinfo", &["vivid"]))
                    .requires_command("modinfo"),
                ProbeDefinition::new("uvc info", Operation::exec("modinfo", &["uvcvideo"]))
                    .requires_command("modinfo"),
            ],
        )]
    }

    #[test]
    fn missing_directory_aborts_before_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = dir.path().join("missing").join("report.txt");
        let mut compiler = ReportCompiler::new(&NothingPresent, CompileOptions::default());

        let err = compiler
            .compile(&gated_group(), &sink)
            .expect_err("missing directory must fail");
        assert!(matches!(err, CompileError::SinkUnavailable { .. }));
        assert_eq!(compiler.state(), RunState::Aborted);
        assert!(!sink.exists());
    }

    #[test]
    fn directory_as_sink_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = validate_sink(dir.path()).expect_err("directory is not a sink");
        assert!(err.to_string().contains("path is a directory"));
    }

    #[test]
    fn unavailable_probes_still_produce_subsections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = dir.path().join("report.txt");
        let mut compiler = ReportCompiler::new(&NothingPresent, CompileOptions::default());

        let summary = compiler.compile(&gated_group(), &sink).expect("compile");
        assert_eq!(compiler.state(), RunState::Done);
        assert_eq!(summary.total_probes, 2);
        assert_eq!(summary.unavailable, 2);
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.output_path, Some(sink.to_string_lossy().to_string()));

        let text = std::fs::read_to_string(&sink).expect("read report");
        assert_eq!(text.matches("[NOT AVAILABLE - modinfo not installed]").count(), 2);
        assert!(text.find("--- vivid info ---") < text.find("--- uvc info ---"));
    }

    #[test]
    fn events_follow_declared_order() {
        let checker = Present(HashSet::from([Capability::command("modinfo")]));
        let mut compiler = ReportCompiler::new(&checker, CompileOptions::default());
        let mut events = Vec::new();

        compiler
            .stream(&gated_group(), Vec::new(), identity(), |event| {
                events.push(event.clone())
            })
            .expect("stream");

        let rendered = events
            .iter()
            .map(|event| serde_json::to_value(event).expect("event serializes"))
            .collect::<Vec<_>>();
        assert_eq!(rendered[0]["event"], "group_started");
        assert_eq!(rendered[1]["description"], "vivid info");
        assert_eq!(rendered[1]["seq"], 1);
        assert_eq!(rendered[2]["description"], "uvc info");
        assert_eq!(rendered[2]["total"], 2);
    }

    #[test]
    fn broken_sink_mid_run_is_a_write_error_with_well_formed_prefix() {
        let mut compiler = ReportCompiler::new(&NothingPresent, CompileOptions::default());
        let mut sink = BrokenPipe {
            written: Vec::new(),
            budget: 700,
        };

        let err = compiler
            .stream(&gated_group(), &mut sink, identity(), |_| {})
            .expect_err("sink breaks");
        assert!(matches!(err, CompileError::Write(_)));

        let text = String::from_utf8(sink.written).expect("utf8");
        assert!(text.starts_with(&"=".repeat(80)));
        assert!(text.ends_with('\n'));
        assert!(!text.contains("END OF DIAGNOSTIC INFORMATION"));
    }
}
