//! ffprobe/ffmpeg backed frame source.
//!
//! Probing goes through `ffprobe -of json`; decoding pipes `rawvideo` rgb24 out of
//! `ffmpeg`, one frame being exactly `width * height * 3` bytes.

use super::frame::Frame;
use super::source::{FrameSource, VideoInfo, VideoOpener};
use crate::core::error::{ExtractorError, Result};
use log::debug;
use serde::Deserialize;
use std::ffi::OsString;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

/// How much of ffmpeg's stderr is kept for error messages.
const STDERR_TAIL_BYTES: usize = 1024;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// "30000/1001" -> 29.97; "0/0" and garbage -> None
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn parse_probe(json: &str, path: &Path) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ExtractorError::unreadable(path, format!("bad ffprobe output: {}", e)))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| ExtractorError::unreadable(path, "no video stream"))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(0.0);
    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .and_then(|f| f.duration)
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d >= 0.0);
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| duration.map(|d| (d * fps).round() as u64))
        .unwrap_or(0);

    let mut info = VideoInfo::new(
        stream.width.unwrap_or(0),
        stream.height.unwrap_or(0),
        fps,
        frame_count,
    );
    if let Some(d) = duration {
        info.duration = d;
    }
    info.validated(path)
}

#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn probe(&self, path: &Path) -> Result<VideoInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
            .arg("stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,duration:format=duration")
            .args(["-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ExtractorError::unreadable(path, format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractorError::unreadable(
                path,
                format!("ffprobe failed ({}): {}", output.status, stderr.trim()),
            ));
        }
        parse_probe(&String::from_utf8_lossy(&output.stdout), path)
    }
}

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let info = self.probe(path)?;
        debug!(
            "Probed {:?}: {}x{} @ {:.3}fps, {} frames",
            path, info.width, info.height, info.fps, info.frame_count
        );
        Ok(Box::new(FfmpegSource::new(
            self.ffmpeg.clone(),
            path.to_path_buf(),
            info,
        )))
    }
}

fn stderr_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

/// Drain the pipe on a helper thread so ffmpeg never blocks on a full stderr.
fn collect_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut tail = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > 2 * STDERR_TAIL_BYTES {
                        tail.drain(..tail.len() - STDERR_TAIL_BYTES);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        stderr_tail(&tail)
    })
}

fn with_stderr(reason: String, stderr: &str) -> String {
    if stderr.is_empty() {
        reason
    } else {
        format!("{}: {}", reason, stderr)
    }
}

struct Decoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
}

impl Decoder {
    /// Reap the child and collect what it printed on stderr.
    fn wait(mut self) -> (io::Result<ExitStatus>, String) {
        let status = self.child.wait();
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        (status, stderr)
    }
}

pub struct FfmpegSource {
    ffmpeg: PathBuf,
    path: PathBuf,
    info: VideoInfo,
    start_index: u64,
    read: u64,
    decoder: Option<Decoder>,
    finished: bool,
}

impl FfmpegSource {
    fn new(ffmpeg: PathBuf, path: PathBuf, info: VideoInfo) -> Self {
        Self {
            ffmpeg,
            path,
            info,
            start_index: 0,
            read: 0,
            decoder: None,
            finished: false,
        }
    }

    /// The `fps` filter pins the output to the detected rate, so frame N really
    /// sits at N / fps even for variable frame rate sources.
    fn decoder_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-v".into(), "error".into(), "-nostdin".into()];
        if self.start_index > 0 {
            let seek = self.start_index as f64 / self.info.fps;
            args.push("-ss".into());
            args.push(format!("{:.6}", seek).into());
        }
        args.push("-i".into());
        args.push(self.path.clone().into_os_string());
        args.extend(["-an", "-sn", "-vf"].map(OsString::from));
        args.push(format!("fps={}", self.info.fps).into());
        args.extend(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"].map(OsString::from));
        args
    }

    fn spawn_decoder(&mut self) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(self.decoder_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            ExtractorError::unreadable(&self.path, format!("failed to run ffmpeg: {}", e))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::unreadable(&self.path, "ffmpeg stdout unavailable"))?;
        let stderr = child.stderr.take().map(collect_stderr);
        self.decoder = Some(Decoder {
            child,
            stdout: BufReader::with_capacity(self.info.frame_size().max(8192), stdout),
            stderr,
        });
        Ok(())
    }

    /// Kill and reap the decoder, returning its stderr tail.
    fn stop_decoder(&mut self) -> String {
        match self.decoder.take() {
            Some(mut decoder) => {
                let _ = decoder.child.kill();
                decoder.wait().1
            }
            None => String::new(),
        }
    }

    fn decode_error(&self, reason: String) -> ExtractorError {
        ExtractorError::Decode {
            path: self.path.clone(),
            frame_index: self.position(),
            reason,
        }
    }

    /// Fill `buf` completely; returns the number of bytes read before EOF.
    fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn position(&self) -> u64 {
        self.start_index + self.read
    }

    fn seek_to_time(&mut self, seconds: f64) -> Result<()> {
        self.stop_decoder();
        self.start_index = self.info.frame_index_at(seconds);
        self.read = 0;
        self.finished = false;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        if self.decoder.is_none() {
            self.spawn_decoder()?;
        }

        let mut buf = vec![0u8; self.info.frame_size()];
        let read = match self.decoder.as_mut() {
            Some(decoder) => Self::read_full(&mut decoder.stdout, &mut buf),
            None => return Ok(None),
        };

        match read {
            Ok(n) if n == buf.len() => {
                let index = self.position();
                self.read += 1;
                let timestamp = index as f64 / self.info.fps;
                Ok(Some(Frame::new(
                    self.info.width,
                    self.info.height,
                    buf,
                    timestamp,
                    index,
                )))
            }
            Ok(0) => {
                self.finished = true;
                let Some(decoder) = self.decoder.take() else {
                    return Ok(None);
                };
                match decoder.wait() {
                    (Ok(s), stderr) if !s.success() => Err(self.decode_error(with_stderr(
                        format!("ffmpeg exited with {}", s),
                        &stderr,
                    ))),
                    (Err(e), _) => Err(self.decode_error(format!("waiting for ffmpeg: {}", e))),
                    _ => Ok(None),
                }
            }
            Ok(n) => {
                self.finished = true;
                let stderr = self.stop_decoder();
                Err(self.decode_error(with_stderr(
                    format!("truncated frame: {} of {} bytes", n, buf.len()),
                    &stderr,
                )))
            }
            Err(e) => {
                self.finished = true;
                let stderr = self.stop_decoder();
                Err(self.decode_error(with_stderr(e.to_string(), &stderr)))
            }
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if self.decoder.is_some() {
            debug!("Releasing decoder for {:?}", self.path);
        }
        self.stop_decoder();
    }
}
