use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::config::ProcessingSettings;
use crate::error::ProcessError;
use crate::processor::DocumentProcessor;

const STDERR_LIMIT: usize = 2000;

/// Runs an external program per document. `{document}` and `{model}` in the
/// configured argv are substituted; `settings.extra` arrives as JSON on stdin
/// and the program must print a JSON value on stdout.
pub struct CommandProcessor;

impl CommandProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn substitute(arg: &str, path: &Path, settings: &ProcessingSettings) -> String {
    arg.replace("{document}", &path.to_string_lossy())
        .replace("{model}", settings.model.as_deref().unwrap_or(""))
}

/// Writes the payload to the child's stdin. On a write error other than a
/// closed pipe the child is killed and reaped before the error is returned.
fn feed_stdin<W: Write>(child: &mut Child, mut stdin: W, payload: &[u8]) -> std::io::Result<()> {
    match stdin.write_all(payload) {
        Ok(()) => Ok(()),
        // the program may exit without reading its input
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => {
            drop(stdin);
            let _ = child.kill();
            let _ = child.wait();
            Err(e)
        }
    }
}

impl DocumentProcessor for CommandProcessor {
    fn process(
        &self,
        path: &Path,
        settings: &ProcessingSettings,
    ) -> Result<serde_json::Value, ProcessError> {
        let (program, args) = settings
            .command
            .split_first()
            .ok_or_else(|| ProcessError::NotConfigured("processing.command is empty".to_string()))?;

        let program = substitute(program, path, settings);
        let args: Vec<String> = args.iter().map(|a| substitute(a, path, settings)).collect();

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProcessError::Spawn {
                command: program.clone(),
                source: e,
            })?;

        if let Some(stdin) = child.stdin.take() {
            let payload = serde_json::Value::Object(settings.extra.clone()).to_string();
            feed_stdin(&mut child, stdin, payload.as_bytes()).map_err(|e| ProcessError::Spawn {
                command: program.clone(),
                source: e,
            })?;
        }

        let output = child.wait_with_output().map_err(|e| ProcessError::Spawn {
            command: program.clone(),
            source: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(STDERR_LIMIT).collect();
            return Err(ProcessError::CommandFailed {
                command: program,
                status: output.status.to_string(),
                stderr,
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ProcessError::InvalidOutput(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ProcessorKind;

    fn settings(command: &[&str]) -> ProcessingSettings {
        ProcessingSettings {
            processor: ProcessorKind::Command,
            command: command.iter().map(|s| s.to_string()).collect(),
            model: Some("small-model".to_string()),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_placeholders_and_json_output() {
        let settings = settings(&[
            "sh",
            "-c",
            r#"printf '{"doc":"%s","model":"%s"}' "$0" "$1""#,
            "{document}",
            "{model}",
        ]);

        let result = CommandProcessor::new()
            .process(Path::new("/d/a.pdf"), &settings)
            .unwrap();

        assert_eq!(result["doc"], "/d/a.pdf");
        assert_eq!(result["model"], "small-model");
    }

    #[test]
    fn test_extra_settings_arrive_on_stdin() {
        let mut settings = settings(&["cat"]);
        settings
            .extra
            .insert("criteria".to_string(), serde_json::json!(["rct"]));

        let result = CommandProcessor::new()
            .process(Path::new("/d/a.pdf"), &settings)
            .unwrap();

        assert_eq!(result["criteria"][0], "rct");
    }

    #[test]
    fn test_non_zero_exit_is_failure() {
        let settings = settings(&["sh", "-c", "echo rate limited >&2; exit 4"]);
        match CommandProcessor::new().process(Path::new("/d/a.pdf"), &settings) {
            Err(ProcessError::CommandFailed { stderr, .. }) => {
                assert_eq!(stderr, "rate limited");
            }
            other => panic!("Expected CommandFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_output() {
        let settings = settings(&["sh", "-c", "echo not json"]);
        let result = CommandProcessor::new().process(Path::new("/d/a.pdf"), &settings);
        assert!(matches!(result, Err(ProcessError::InvalidOutput(_))));
    }

    #[test]
    fn test_empty_command() {
        let result = CommandProcessor::new().process(Path::new("/d/a.pdf"), &settings(&[]));
        assert!(matches!(result, Err(ProcessError::NotConfigured(_))));
    }

    struct RejectingPipe;

    impl Write for RejectingPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "device full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_stdin_write_reaps_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        let result = feed_stdin(&mut child, RejectingPipe, b"{}");

        assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::Other);
        let status = child.try_wait().unwrap();
        assert!(status.is_some(), "child should be killed and reaped");
    }

    #[test]
    fn test_closed_stdin_is_not_an_error() {
        let mut child = Command::new("true").stdin(Stdio::piped()).spawn().unwrap();
        let stdin = child.stdin.take().unwrap();
        child.wait().unwrap();

        let payload = vec![b'x'; 1 << 20];
        assert!(feed_stdin(&mut child, stdin, &payload).is_ok());
    }

    #[test]
    fn test_missing_program() {
        let settings = settings(&["/nonexistent/llm-client"]);
        let result = CommandProcessor::new().process(Path::new("/d/a.pdf"), &settings);
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
