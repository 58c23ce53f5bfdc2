//! Execution wrapper for invoking `zfs`.
//!
//! Keeps process handling and failure classification in one place so the
//! driver logic stays testable (fake binaries, deterministic stdout parsing).

use crate::parse::{parse_clones, parse_names, parse_value};
use graphzfs_core::error::{GraphzfsError, GraphzfsResult};
use log::debug;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub(crate) struct ZfsCommand {
    binary: PathBuf,
    timeout: Option<Duration>,
}

#[derive(Debug)]
struct Output {
    stdout: String,
    stderr: String,
    status: i32,
}

impl ZfsCommand {
    pub(crate) fn new(binary: PathBuf, timeout: Option<Duration>) -> Self {
        Self { binary, timeout }
    }

    pub(crate) fn binary(&self) -> &Path {
        &self.binary
    }

    pub(crate) fn create(&self, dataset: &str) -> GraphzfsResult<()> {
        self.checked("create dataset", &["create", "-p", dataset])
            .map(drop)
    }

    pub(crate) fn snapshot(&self, snapshot: &str) -> GraphzfsResult<()> {
        self.checked("snapshot parent", &["snapshot", snapshot])
            .map(drop)
    }

    pub(crate) fn clone_snapshot(&self, snapshot: &str, target: &str) -> GraphzfsResult<()> {
        self.checked("clone parent snapshot", &["clone", snapshot, target])
            .map(drop)
    }

    /// Mark `snapshot` for destruction once its last clone is gone.
    pub(crate) fn destroy_deferred(&self, snapshot: &str) -> GraphzfsResult<()> {
        self.checked("defer snapshot destroy", &["destroy", "-d", snapshot])
            .map(drop)
    }

    pub(crate) fn destroy(&self, name: &str) -> GraphzfsResult<()> {
        self.checked("destroy", &["destroy", name]).map(drop)
    }

    pub(crate) fn destroy_recursive(&self, dataset: &str) -> GraphzfsResult<()> {
        self.checked("destroy dataset", &["destroy", "-r", dataset])
            .map(drop)
    }

    pub(crate) fn promote(&self, clone: &str) -> GraphzfsResult<()> {
        self.checked("promote clone", &["promote", clone]).map(drop)
    }

    pub(crate) fn mountpoint(&self, dataset: &str) -> GraphzfsResult<String> {
        let out = self.checked(
            "get mountpoint",
            &["get", "-Ho", "value", "mountpoint", dataset],
        )?;
        Ok(parse_value(&out.stdout))
    }

    pub(crate) fn list_snapshots(&self, dataset: &str) -> GraphzfsResult<Vec<String>> {
        let out = self.checked(
            "list snapshots",
            &["list", "-rt", "snapshot", "-Ho", "name", dataset],
        )?;
        Ok(parse_names(&out.stdout))
    }

    pub(crate) fn clones(&self, snapshot: &str) -> GraphzfsResult<Vec<String>> {
        let out = self.checked("get clones", &["get", "-Ho", "value", "clones", snapshot])?;
        Ok(parse_clones(&out.stdout))
    }

    fn checked(&self, step: &str, args: &[&str]) -> GraphzfsResult<Output> {
        let out = self.run(args)?;
        if out.status == 0 {
            return Ok(out);
        }
        Err(classify_failure(step, &self.render(args), &out))
    }

    fn render(&self, args: &[&str]) -> String {
        let mut rendered = self.binary.display().to_string();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }

    fn run(&self, args: &[&str]) -> GraphzfsResult<Output> {
        let rendered = self.render(args);
        debug!("exec {rendered}");

        let mut command = Command::new(&self.binary);
        command.args(args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|err| {
            GraphzfsError::Provider(format!("failed to spawn `{rendered}`: {err}"))
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        self.wait(child, stdout_pipe, stderr_pipe, &rendered)
    }

    fn wait(
        &self,
        mut child: Child,
        stdout_pipe: Option<ChildStdout>,
        stderr_pipe: Option<ChildStderr>,
        rendered: &str,
    ) -> GraphzfsResult<Output> {
        let stdout_handle = spawn_output_reader(stdout_pipe);
        let stderr_handle = spawn_output_reader(stderr_pipe);

        let exit_status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => match wait_until(&mut child, timeout)? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GraphzfsError::Timeout {
                        command: rendered.to_string(),
                        timeout,
                    });
                }
            },
        };

        let stdout = stdout_handle
            .join()
            .map_err(|_| GraphzfsError::Provider("stdout reader thread panicked".into()))??;
        let stderr = stderr_handle
            .join()
            .map_err(|_| GraphzfsError::Provider("stderr reader thread panicked".into()))??;

        let status = exit_status.code().unwrap_or(-1);
        debug!("exit {status} from {rendered}");

        Ok(Output {
            stdout,
            stderr,
            status,
        })
    }
}

fn wait_until(child: &mut Child, timeout: Duration) -> GraphzfsResult<Option<ExitStatus>> {
    let start = Instant::now();
    while start.elapsed() <= timeout {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        thread::sleep(Duration::from_millis(25));
    }
    Ok(None)
}

fn classify_failure(step: &str, command: &str, output: &Output) -> GraphzfsError {
    let diagnostic = output_diagnostic(output);
    let lower = diagnostic.to_ascii_lowercase();

    if lower.contains("does not exist") {
        return GraphzfsError::NotFound {
            step: step.to_string(),
            command: command.to_string(),
            diagnostic,
        };
    }

    if lower.contains("already exists") {
        return GraphzfsError::AlreadyExists {
            step: step.to_string(),
            command: command.to_string(),
            diagnostic,
        };
    }

    let diagnostic = if diagnostic.is_empty() {
        "no additional output".to_string()
    } else if lower.contains("permission denied")
        || lower.contains("operation not permitted")
        || lower.contains("not permitted")
    {
        format!(
            "{diagnostic}. This usually requires elevated privileges (run as root or delegate with `zfs allow`)"
        )
    } else {
        diagnostic
    };

    GraphzfsError::Command {
        step: step.to_string(),
        command: command.to_string(),
        status: output.status,
        diagnostic,
    }
}

fn output_diagnostic(output: &Output) -> String {
    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();
    if !stderr.is_empty() {
        stderr.to_string()
    } else {
        stdout.to_string()
    }
}

fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<GraphzfsResult<String>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || -> GraphzfsResult<String> {
        if let Some(mut reader) = pipe {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        } else {
            Ok(String::new())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str, stdout: &str) -> Output {
        Output {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status: 1,
        }
    }

    #[test]
    fn missing_dataset_maps_to_not_found() {
        let err = classify_failure(
            "get mountpoint",
            "zfs get -Ho value mountpoint storage/docker/x",
            &failed("cannot open 'storage/docker/x': dataset does not exist\n", ""),
        );
        match err {
            GraphzfsError::NotFound {
                step,
                command,
                diagnostic,
            } => {
                assert_eq!(step, "get mountpoint");
                assert_eq!(command, "zfs get -Ho value mountpoint storage/docker/x");
                assert_eq!(diagnostic, "cannot open 'storage/docker/x': dataset does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn collisions_map_to_already_exists() {
        let err = classify_failure(
            "snapshot parent",
            "zfs snapshot storage/docker/a@b",
            &failed("cannot create snapshot 'storage/docker/a@b': dataset already exists", ""),
        );
        assert!(matches!(err, GraphzfsError::AlreadyExists { ref step, .. } if step == "snapshot parent"));
    }

    #[test]
    fn other_failures_keep_step_and_raw_diagnostic() {
        let err = classify_failure(
            "clone parent snapshot",
            "zfs clone storage/docker/a@b storage/docker/b",
            &failed("", "cannot create 'storage/docker/b': out of space\n"),
        );
        match err {
            GraphzfsError::Command {
                step,
                command,
                status,
                diagnostic,
            } => {
                assert_eq!(step, "clone parent snapshot");
                assert_eq!(command, "zfs clone storage/docker/a@b storage/docker/b");
                assert_eq!(status, 1);
                assert_eq!(diagnostic, "cannot create 'storage/docker/b': out of space");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn permission_failures_carry_a_hint() {
        let err = classify_failure(
            "create dataset",
            "zfs create -p storage/docker/a",
            &failed("cannot create 'storage/docker/a': permission denied", ""),
        );
        assert!(err.to_string().contains("zfs allow"));
    }

    #[test]
    fn silent_failures_say_so() {
        let err = classify_failure("promote clone", "zfs promote x", &failed("", ""));
        assert!(err.to_string().ends_with("no additional output"));
    }

    #[test]
    fn render_joins_binary_and_args() {
        let zfs = ZfsCommand::new(PathBuf::from("/sbin/zfs"), None);
        assert_eq!(
            zfs.render(&["destroy", "-r", "storage/docker/a"]),
            "/sbin/zfs destroy -r storage/docker/a"
        );
        assert_eq!(zfs.binary(), Path::new("/sbin/zfs"));
    }
}
