//! ffmpeg-backed transcoder.

use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{
    TranscodeError, TranscodeMode, TranscodeOutput, TranscodeRequest, TranscodeResult, Transcoder,
};
use crate::models::Backend;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Back channel cropped to 4:3, corners rounded, scaled to a third of the
/// main width and placed top-centre. Input 0 is the overlay, input 1 main.
const PIP_FILTER: &str = "[0]crop=iw:ih*3/4:0:ih/8[overlay];\
[overlay]format=yuva420p,geq=lum='p(X,Y)':a='if(gt(abs(W/2-X),W/2-32)*gt(abs(H/2-Y),H/2-32),\
if(lte(hypot(32-(W/2-abs(W/2-X)),32-(H/2-abs(H/2-Y))),32),255,0),255)'[overlay];\
[overlay][1]scale2ref=iw/3:ow/mdar[overlay][main];\
[main][overlay]overlay=main_w/3:main_h/50";

const AUDIO_ARGS: [&str; 6] = ["-c:a", "aac", "-b:a", "64k", "-ac", "1"];

/// Transcoder that shells out to ffmpeg.
///
/// The backend is the quality profile: it only selects the video encoder
/// arguments for solo and composite encodes.
pub struct FfmpegTranscoder {
    /// ffmpeg executable (bare name = look up in PATH).
    ffmpeg_path: PathBuf,
    backend: Backend,
    /// Kill the process after this long. `None` waits forever.
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(backend: Backend, timeout: Option<Duration>) -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            backend,
            timeout,
        }
    }

    /// Set a custom path to the ffmpeg executable.
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    fn encoder_args(&self) -> &'static [&'static str] {
        match self.backend {
            Backend::Cpu => &[
                "-c:v",
                "libx265",
                "-preset",
                "5",
                "-vtag",
                "hvc1",
                "-x265-params",
                "log-level=error",
                "-crf",
                "30",
            ],
            Backend::Nvidia => &[
                "-c:v",
                "hevc_nvenc",
                "-vtag",
                "hvc1",
                "-rc",
                "constqp",
                "-qp",
                "37",
            ],
            Backend::Apple => &["-c:v", "hevc_videotoolbox", "-vtag", "hvc1"],
        }
    }

    /// Build the argument list. `concat_list` is required for concat mode.
    fn build_args(&self, request: &TranscodeRequest, concat_list: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
            .iter()
            .map(OsString::from)
            .collect();

        match request.mode {
            TranscodeMode::Concat => {
                args.extend(
                    ["-err_detect", "ignore_err", "-f", "concat", "-safe", "0", "-i"]
                        .iter()
                        .map(OsString::from),
                );
                if let Some(list) = concat_list {
                    args.push(list.as_os_str().to_os_string());
                }
                args.extend(["-c", "copy"].iter().map(OsString::from));
            }
            TranscodeMode::Solo => {
                args.push("-i".into());
                args.push(request.inputs[0].as_os_str().to_os_string());
                args.extend(self.encoder_args().iter().map(OsString::from));
                args.extend(AUDIO_ARGS.iter().map(OsString::from));
            }
            TranscodeMode::Composite => {
                // Overlay goes in as input 0, main as input 1.
                args.push("-i".into());
                args.push(request.inputs[1].as_os_str().to_os_string());
                args.push("-i".into());
                args.push(request.inputs[0].as_os_str().to_os_string());
                args.push("-filter_complex".into());
                args.push(PIP_FILTER.into());
                args.extend(self.encoder_args().iter().map(OsString::from));
                args.extend(AUDIO_ARGS.iter().map(OsString::from));
            }
        }

        args.push(request.output.as_os_str().to_os_string());
        args
    }

    /// Write the concat demuxer list next to the output.
    fn write_concat_list(&self, request: &TranscodeRequest) -> TranscodeResult<tempfile::NamedTempFile> {
        let dir = request
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut list = tempfile::Builder::new()
            .prefix(".concat-")
            .suffix(".txt")
            .tempfile_in(dir)
            .map_err(|e| TranscodeError::io("creating concat list", e))?;

        for input in &request.inputs {
            let absolute = fs::canonicalize(input)
                .map_err(|e| TranscodeError::io(format!("resolving {}", input.display()), e))?;
            writeln!(list, "file '{}'", escape_concat_path(&absolute))
                .map_err(|e| TranscodeError::io("writing concat list", e))?;
        }
        list.flush()
            .map_err(|e| TranscodeError::io("writing concat list", e))?;

        Ok(list)
    }

    /// Spawn ffmpeg, collect stderr, and enforce the timeout.
    fn run(&self, args: &[OsString]) -> TranscodeResult<TranscodeOutput> {
        let tool = self.name().to_string();

        let mut child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        // Drain stderr on a thread so a chatty ffmpeg never blocks on a full pipe.
        let stderr = child.stderr.take();
        let reader = thread::spawn(move || {
            stderr
                .map(|s| BufReader::new(s).lines().map_while(Result::ok).collect())
                .unwrap_or_else(Vec::new)
        });

        let started = Instant::now();
        let status = loop {
            match child
                .try_wait()
                .map_err(|e| TranscodeError::io("waiting for ffmpeg", e))?
            {
                Some(status) => break Some(status),
                None if self.timeout.is_some_and(|t| started.elapsed() >= t) => {
                    tracing::warn!("ffmpeg exceeded {:?}, killing", self.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let stderr_lines: Vec<String> = reader.join().unwrap_or_default();

        match status {
            Some(status) if status.success() => Ok(TranscodeOutput { stderr_lines }),
            Some(status) => Err(TranscodeError::Failed {
                tool,
                exit_code: status.code().unwrap_or(-1),
                stderr_lines,
            }),
            None => Err(TranscodeError::TimedOut {
                tool,
                secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                stderr_lines,
            }),
        }
    }
}

/// Quote a path for a concat list `file '...'` line.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn describe(&self, request: &TranscodeRequest) -> String {
        let list = PathBuf::from("<concat list>");
        let concat_list = (request.mode == TranscodeMode::Concat).then_some(list.as_path());
        let args: Vec<String> = self
            .build_args(request, concat_list)
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        format!("{} {}", self.ffmpeg_path.display(), args.join(" "))
    }

    fn invoke(&self, request: &TranscodeRequest) -> TranscodeResult<TranscodeOutput> {
        request.validate()?;

        // The list file must outlive the process; it is removed on drop.
        let list = match request.mode {
            TranscodeMode::Concat => Some(self.write_concat_list(request)?),
            _ => None,
        };
        let args = self.build_args(request, list.as_ref().map(|l| l.path()));

        tracing::debug!(
            "Running: {} ({} input(s), {} backend)",
            self.name(),
            request.inputs.len(),
            self.backend
        );

        self.run(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(t: &FfmpegTranscoder, req: &TranscodeRequest) -> Vec<String> {
        t.build_args(req, Some(Path::new("/tmp/list.txt")))
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn composite_puts_overlay_first() {
        let t = FfmpegTranscoder::new(Backend::Cpu, None);
        let req = TranscodeRequest::new(
            TranscodeMode::Composite,
            vec![PathBuf::from("/o/main_a.MP4"), PathBuf::from("/o/over_b.MP4")],
            "/o/.partial.main.mp4",
        );
        let args = args_of(&t, &req);

        let first_input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[first_input + 1], "/o/over_b.MP4");
        assert_eq!(args[first_input + 3], "/o/main_a.MP4");
        assert!(args.contains(&"-filter_complex".to_string()));
        assert!(args.contains(&"libx265".to_string()));
        assert_eq!(args.last().unwrap(), "/o/.partial.main.mp4");
    }

    #[test]
    fn backend_selects_encoder() {
        let req = TranscodeRequest::new(
            TranscodeMode::Solo,
            vec![PathBuf::from("in.MP4")],
            "out.mp4",
        );
        let nvidia = args_of(&FfmpegTranscoder::new(Backend::Nvidia, None), &req);
        assert!(nvidia.contains(&"hevc_nvenc".to_string()));
        let apple = args_of(&FfmpegTranscoder::new(Backend::Apple, None), &req);
        assert!(apple.contains(&"hevc_videotoolbox".to_string()));
        assert!(!apple.contains(&"-filter_complex".to_string()));
    }

    #[test]
    fn concat_stream_copies_from_list() {
        let t = FfmpegTranscoder::new(Backend::Cpu, None);
        let req = TranscodeRequest::new(
            TranscodeMode::Concat,
            vec![PathBuf::from("a"), PathBuf::from("b")],
            "joined.MP4",
        );
        let args = args_of(&t, &req).join(" ");
        assert!(args.contains("-f concat -safe 0 -i /tmp/list.txt -c copy joined.MP4"));
        assert!(!args.contains("libx265"));
    }

    #[test]
    fn escapes_quotes_in_concat_paths() {
        assert_eq!(
            escape_concat_path(Path::new("/clips/it's.MP4")),
            "/clips/it'\\''s.MP4"
        );
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.MP4");
        fs::write(&input, b"x").unwrap();

        let t = FfmpegTranscoder::new(Backend::Cpu, Some(Duration::from_secs(5)))
            .with_ffmpeg_path(dir.path().join("no-such-ffmpeg"));
        let req = TranscodeRequest::new(TranscodeMode::Solo, vec![input], dir.path().join("o.mp4"));

        assert!(matches!(t.invoke(&req), Err(TranscodeError::Spawn { .. })));
    }

    /// Executable shell script standing in for ffmpeg.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ffmpeg.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn slow_process_is_killed_on_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.MP4");
        fs::write(&input, b"x").unwrap();
        let script = fake_ffmpeg(dir.path(), "echo 'frame=1' >&2\nexec sleep 5");

        let t = FfmpegTranscoder::new(Backend::Cpu, Some(Duration::from_secs(1)))
            .with_ffmpeg_path(script);
        let req = TranscodeRequest::new(TranscodeMode::Solo, vec![input], dir.path().join("o.mp4"));

        let started = Instant::now();
        match t.invoke(&req) {
            Err(TranscodeError::TimedOut {
                secs, stderr_lines, ..
            }) => {
                assert_eq!(secs, 1);
                assert_eq!(stderr_lines, vec!["frame=1"]);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_a_failure_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.MP4");
        fs::write(&input, b"x").unwrap();
        let script = fake_ffmpeg(
            dir.path(),
            "echo 'Invalid data found when processing input' >&2\nexit 3",
        );

        let t = FfmpegTranscoder::new(Backend::Cpu, Some(Duration::from_secs(30)))
            .with_ffmpeg_path(script);
        let req = TranscodeRequest::new(TranscodeMode::Solo, vec![input], dir.path().join("o.mp4"));

        match t.invoke(&req) {
            Err(TranscodeError::Failed {
                exit_code,
                stderr_lines,
                ..
            }) => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr_lines, vec!["Invalid data found when processing input"]);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn successful_process_returns_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.MP4");
        fs::write(&input, b"x").unwrap();
        let script = fake_ffmpeg(dir.path(), "echo 'done' >&2\nexit 0");

        let t = FfmpegTranscoder::new(Backend::Cpu, None).with_ffmpeg_path(script);
        let req = TranscodeRequest::new(TranscodeMode::Solo, vec![input], dir.path().join("o.mp4"));

        let output = t.invoke(&req).unwrap();
        assert_eq!(output.stderr_lines, vec!["done"]);
    }
}
