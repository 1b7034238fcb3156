//! Stream geometry via `ffprobe`: metadata only, nothing is decoded.

use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use rtsp_proto::protocol::StreamGeometry;

use crate::error::ProbeError;

/// Frame rate used when the stream reports nothing usable or less than 1 fps.
pub const MIN_FPS: u32 = 1;

/// Largest width or height accepted from a probe.
pub const MAX_DIMENSION: i64 = 16384;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamProbe {
    ffprobe: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl StreamProbe {
    /// `timeout` of `None` waits for ffprobe indefinitely.
    pub fn new(ffprobe: Option<PathBuf>, timeout: Option<Duration>) -> Self {
        Self { ffprobe, timeout }
    }

    pub fn args(url: &str) -> Vec<String> {
        [
            "-v",
            "error",
            "-rtsp_transport",
            "tcp",
            "-select_streams",
            "v:0",
            "-show_streams",
            "-print_format",
            "json",
            url,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn probe(&self, url: &str) -> Result<StreamGeometry, ProbeError> {
        let ffprobe = self.ffprobe.as_ref().ok_or(ProbeError::BinaryMissing)?;
        info!("probe: querying {}", url);

        let mut cmd = Command::new(ffprobe);
        cmd.args(Self::args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = run_with_timeout(&mut cmd, self.timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("probe: {} failed: {} {}", url, output.status, stderr);
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let geometry = parse_probe_output(&output.stdout)?;
        info!("probe: {} is {}", url, geometry);
        Ok(geometry)
    }
}

/// Extract the first video stream's geometry from ffprobe's JSON.
pub fn parse_probe_output(json: &[u8]) -> Result<StreamGeometry, ProbeError> {
    let parsed: ProbeOutput = serde_json::from_slice(json)?;
    let video = parsed
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or(ProbeError::NoVideo)?;

    let width = video.width.unwrap_or(0);
    let height = video.height.unwrap_or(0);
    if width <= 0 || height <= 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ProbeError::BadGeometry { width, height });
    }

    let fps = fps_from_rates(video.r_frame_rate.as_deref(), video.avg_frame_rate.as_deref());
    Ok(StreamGeometry {
        width: width as u32,
        height: height as u32,
        fps,
    })
}

/// Parse an ffprobe rational such as `"15/1"` or `"30000/1001"`, truncating
/// to a whole number of frames per second. `None` when malformed or `x/0`.
pub fn parse_frame_rate(rate: &str) -> Option<u32> {
    let rate = rate.trim();
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<u64>().ok()?, d.trim().parse::<u64>().ok()?),
        None => (rate.parse::<u64>().ok()?, 1),
    };
    if den == 0 {
        return None;
    }
    u32::try_from(num / den).ok()
}

/// Pick the real frame rate, falling back to the average, never below `MIN_FPS`.
pub fn fps_from_rates(r_frame_rate: Option<&str>, avg_frame_rate: Option<&str>) -> u32 {
    let parsed = r_frame_rate
        .and_then(parse_frame_rate)
        .filter(|fps| *fps > 0)
        .or_else(|| avg_frame_rate.and_then(parse_frame_rate))
        .or_else(|| r_frame_rate.and_then(parse_frame_rate));
    match parsed {
        Some(fps) if fps >= MIN_FPS => fps,
        other => {
            warn!(
                "probe: unusable frame rate r={:?} avg={:?} (parsed {:?}), using {}",
                r_frame_rate, avg_frame_rate, other, MIN_FPS
            );
            MIN_FPS
        }
    }
}

/// `Command::output` with a deadline. Pipes are drained on helper threads so a
/// chatty child never blocks on a full pipe while we poll for its exit.
fn run_with_timeout(cmd: &mut Command, timeout: Option<Duration>) -> Result<Output, ProbeError> {
    let mut child = cmd.spawn().map_err(ProbeError::Spawn)?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        match child.try_wait().map_err(ProbeError::Spawn)? {
            Some(status) => break status,
            None => {
                if let Some(limit) = timeout {
                    if started.elapsed() >= limit {
                        warn!("probe: ffprobe exceeded {:?}, killing", limit);
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ProbeError::Timeout(limit));
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    };
    debug!("probe: ffprobe finished in {:?}", started.elapsed());

    let collect = |h: Option<std::thread::JoinHandle<Vec<u8>>>| {
        h.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}
