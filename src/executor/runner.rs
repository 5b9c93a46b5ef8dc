use crate::executor::{io_error, ExecutorError};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RunRequest<'a> {
    pub executable: &'a Path,
    pub args: Vec<String>,
    pub stdin_payload: Option<Vec<u8>>,
    pub cwd: &'a Path,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRun {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one external executable to completion under the deadline. Output is
/// drained on reader threads and stdin is fed from a writer thread so a full
/// pipe on either side cannot stall the deadline loop; on deadline the child
/// is killed and `Timeout` is returned.
pub fn run_executable(request: &RunRequest<'_>) -> Result<RawRun, ExecutorError> {
    let mut command = Command::new(request.executable);
    command
        .current_dir(request.cwd)
        .args(&request.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if request.stdin_payload.is_some() {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExecutorError::ExecutableUnavailable {
                path: request.executable.display().to_string(),
            })
        }
        Err(err) => return Err(io_error(request.executable, err)),
    };

    let stdout = child.stdout.take().ok_or_else(|| {
        io_error(
            request.executable,
            std::io::Error::other("missing stdout pipe"),
        )
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        io_error(
            request.executable,
            std::io::Error::other("missing stderr pipe"),
        )
    })?;

    let stdout_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = BufReader::new(stdout);
        let _ = reader.read_to_string(&mut buf);
        buf
    });
    let stderr_reader = thread::spawn(move || {
        let mut buf = String::new();
        let mut reader = BufReader::new(stderr);
        let _ = reader.read_to_string(&mut buf);
        buf
    });

    // The payload is written from its own thread. A payload larger than the
    // pipe buffer would otherwise block here and stall the deadline loop; a
    // child that exits without draining stdin shows up as its exit code, not
    // as a broken-pipe failure.
    let stdin_writer = request.stdin_payload.clone().and_then(|payload| {
        child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                let _ = stdin.write_all(&payload);
            })
        })
    });

    let start = Instant::now();
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() > request.timeout {
                    // Killing the child closes its end of the stdin pipe,
                    // which unblocks a writer stuck on a full buffer.
                    let _ = child.kill();
                    child
                        .wait()
                        .map_err(|err| io_error(request.executable, err))?;
                    if let Some(writer) = stdin_writer {
                        let _ = writer.join();
                    }
                    let _stdout = stdout_reader.join().unwrap_or_default();
                    let _stderr = stderr_reader.join().unwrap_or_default();
                    return Err(ExecutorError::Timeout {
                        timeout_ms: request.timeout.as_millis() as u64,
                    });
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => return Err(io_error(request.executable, err)),
        }
    };

    if let Some(writer) = stdin_writer {
        let _ = writer.join();
    }
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(RawRun {
        exit_code: exit_status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, body).expect("write script");
        let mut perms = fs::metadata(&path).expect("script metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set script permissions");
        path
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            "mixed.sh",
            "#!/bin/sh\necho 'out line'\necho 'err line' 1>&2\nexit 3\n",
        );
        let run = run_executable(&RunRequest {
            executable: &script,
            args: Vec::new(),
            stdin_payload: None,
            cwd: dir.path(),
            timeout: Duration::from_secs(5),
        })
        .expect("run script");
        assert_eq!(run.exit_code, 3);
        assert_eq!(run.stdout.trim(), "out line");
        assert_eq!(run.stderr.trim(), "err line");
    }

    #[cfg(unix)]
    #[test]
    fn feeds_stdin_payload_to_child() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(dir.path(), "cat.sh", "#!/bin/sh\ncat\n");
        let run = run_executable(&RunRequest {
            executable: &script,
            args: Vec::new(),
            stdin_payload: Some(b"ping".to_vec()),
            cwd: dir.path(),
            timeout: Duration::from_secs(5),
        })
        .expect("run script");
        assert_eq!(run.exit_code, 0);
        assert_eq!(run.stdout, "ping");
    }

    #[cfg(unix)]
    #[test]
    fn kills_child_after_deadline() {
        let dir = tempdir().expect("tempdir");
        let script = write_script(dir.path(), "slow.sh", "#!/bin/sh\nsleep 2\n");
        let err = run_executable(&RunRequest {
            executable: &script,
            args: Vec::new(),
            stdin_payload: None,
            cwd: dir.path(),
            timeout: Duration::from_millis(100),
        })
        .expect_err("deadline should fire");
        match err {
            ExecutorError::Timeout { timeout_ms } => assert_eq!(timeout_ms, 100),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn deadline_fires_while_a_large_stdin_payload_is_still_unread() {
        let dir = tempdir().expect("tempdir");
        // Sleeps without ever reading stdin, so a payload bigger than the
        // pipe buffer stays wedged in the pipe until the child dies. exec
        // keeps the sleeper as the child pid, so the kill closes the pipes.
        let script = write_script(dir.path(), "deaf.sh", "#!/bin/sh\nexec sleep 3\n");
        let started = Instant::now();
        let err = run_executable(&RunRequest {
            executable: &script,
            args: Vec::new(),
            stdin_payload: Some(vec![b'x'; 1_000_000]),
            cwd: dir.path(),
            timeout: Duration::from_millis(200),
        })
        .expect_err("deadline should fire");
        match err {
            ExecutorError::Timeout { timeout_ms } => assert_eq!(timeout_ms, 200),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "run was held past the deadline by the blocked stdin write"
        );
    }

    #[test]
    fn missing_executable_is_reported_as_unavailable() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("not-a-binary");
        let err = run_executable(&RunRequest {
            executable: &missing,
            args: Vec::new(),
            stdin_payload: None,
            cwd: dir.path(),
            timeout: Duration::from_secs(1),
        })
        .expect_err("missing executable");
        match err {
            ExecutorError::ExecutableUnavailable { path } => {
                assert!(path.contains("not-a-binary"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
