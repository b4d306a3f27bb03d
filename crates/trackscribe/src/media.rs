//! ffprobe / ffmpeg adapter.
//!
//! Everything the analysis needs from the outside media toolchain goes through
//! [`MediaTool`], so tests can swap in synthetic audio.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scribeconf::ToolsConfig;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MediaError;
use crate::types::{AnalysisWindow, Loudness, TrackMetadata};

/// Integrated loudness outside this range is treated as a misread.
const PLAUSIBLE_LUFS: (f64, f64) = (-50.0, 0.0);

/// Tail of stderr kept in error messages.
const STDERR_TAIL: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    S16Le,
    F32Le,
}

impl PcmFormat {
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PcmFormat::S16Le => "s16le",
            PcmFormat::F32Le => "f32le",
        }
    }
}

/// Mono decode of one window of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeRequest {
    pub path: PathBuf,
    pub window: AnalysisWindow,
    pub sample_rate: u32,
    pub format: PcmFormat,
}

#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Container and first-audio-stream facts.
    async fn probe_metadata(&self, path: &Path) -> Result<TrackMetadata, MediaError>;

    /// Raw mono PCM bytes for the requested window. Resolves to
    /// [`MediaError::Cancelled`] once `cancel` fires.
    async fn decode_pcm(
        &self,
        request: &DecodeRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, MediaError>;

    /// EBU R128 loudness over the whole track.
    async fn measure_loudness(&self, path: &Path) -> Result<Loudness, MediaError>;
}

/// [`MediaTool`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.ffmpeg.clone(), config.ffprobe.clone())
    }

    /// Run a tool to completion. Dropping the returned future kills the child.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: Option<&CancellationToken>,
    ) -> Result<Output, MediaError> {
        debug!(program, ?args, "spawning media tool");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::Spawn {
                tool: program.to_string(),
                source,
            })?;

        let wait = child.wait_with_output();
        let output = match cancel {
            Some(cancel) => tokio::select! {
                output = wait => output,
                _ = cancel.cancelled() => {
                    return Err(MediaError::Cancelled { tool: program.to_string() });
                }
            },
            None => wait.await,
        }
        .map_err(|source| MediaError::Spawn {
            tool: program.to_string(),
            source,
        })?;

        Ok(output)
    }

    fn check_status(program: &str, output: &Output) -> Result<(), MediaError> {
        if output.status.success() {
            return Ok(());
        }
        Err(MediaError::Exit {
            tool: program.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        })
    }

    async fn ebur128_pass(&self, path: &Path) -> Result<String, MediaError> {
        let args = vec![
            "-nostats".to_string(),
            "-hide_banner".to_string(),
            "-i".to_string(),
            path.display().to_string(),
            "-filter:a".to_string(),
            "ebur128=peak=true".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        let output = self.run(&self.ffmpeg, &args, None).await?;
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }

    async fn loudnorm_pass(&self, path: &Path) -> Result<String, MediaError> {
        let args = vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-i".to_string(),
            path.display().to_string(),
            "-af".to_string(),
            "loudnorm=print_format=json".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        let output = self.run(&self.ffmpeg, &args, None).await?;
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

#[async_trait]
impl MediaTool for Ffmpeg {
    #[tracing::instrument(name = "media.probe", skip_all, fields(path = %path.display()))]
    async fn probe_metadata(&self, path: &Path) -> Result<TrackMetadata, MediaError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-hide_banner".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_entries".to_string(),
            "format=duration,bit_rate:stream=index,codec_type,codec_name,sample_rate,channels"
                .to_string(),
            path.display().to_string(),
        ];
        let output = self.run(&self.ffprobe, &args, None).await?;
        Self::check_status(&self.ffprobe, &output)?;
        parse_probe_json(&output.stdout)
    }

    async fn decode_pcm(
        &self,
        request: &DecodeRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, MediaError> {
        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", request.window.start),
            "-t".to_string(),
            format!("{:.3}", request.window.length),
            "-i".to_string(),
            request.path.display().to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            request.sample_rate.to_string(),
            "-f".to_string(),
            request.format.ffmpeg_name().to_string(),
            "-".to_string(),
        ];

        let output = self.run(&self.ffmpeg, &args, Some(cancel)).await?;
        Self::check_status(&self.ffmpeg, &output)?;
        if output.stdout.is_empty() {
            return Err(MediaError::Empty {
                tool: self.ffmpeg.clone(),
            });
        }
        debug!(
            bytes = output.stdout.len(),
            rate = request.sample_rate,
            format = request.format.ffmpeg_name(),
            "decoded window"
        );
        Ok(output.stdout)
    }

    #[tracing::instrument(name = "media.loudness", skip_all, fields(path = %path.display()))]
    async fn measure_loudness(&self, path: &Path) -> Result<Loudness, MediaError> {
        let primary = parse_ebur128(&self.ebur128_pass(path).await?);
        if primary.lufs_integrated.is_some() {
            return Ok(primary);
        }

        debug!("integrated loudness missing or implausible, trying loudnorm");
        match self.loudnorm_pass(path).await {
            Ok(stderr) => Ok(merge_loudnorm(primary, parse_loudnorm(&stderr))),
            Err(e) => {
                warn!(error = %e, "loudnorm fallback failed");
                Ok(primary)
            }
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL);
    text.chars().skip(skip).collect()
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<Value>,
    bit_rate: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<Value>,
    channels: Option<Value>,
}

/// ffprobe reports most numbers as strings; accept either.
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parse `ffprobe -print_format json` output. Absent fields read as zero.
pub fn parse_probe_json(stdout: &[u8]) -> Result<TrackMetadata, MediaError> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| MediaError::Malformed(e.to_string()))?;

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(TrackMetadata {
        duration_sec: number(probe.format.duration.as_ref()).unwrap_or(0.0),
        bit_rate: number(probe.format.bit_rate.as_ref()).unwrap_or(0.0) as u64,
        sample_rate: audio
            .and_then(|s| number(s.sample_rate.as_ref()))
            .unwrap_or(0.0) as u32,
        channels: audio
            .and_then(|s| number(s.channels.as_ref()))
            .unwrap_or(0.0) as u32,
        codec: audio
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

struct LoudnessPatterns {
    integrated: Vec<Regex>,
    range: Vec<Regex>,
    true_peak: Vec<Regex>,
    loudnorm_i: Regex,
    loudnorm_tp: Regex,
    loudnorm_lra: Regex,
}

fn patterns() -> &'static LoudnessPatterns {
    static PATTERNS: OnceLock<LoudnessPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static loudness pattern");
        const NUM: &str = r"(-?\d+(?:\.\d+)?)";
        LoudnessPatterns {
            integrated: vec![
                re(&format!(r"(?i)\bI:\s*{NUM}\s*LUFS")),
                re(&format!(r"(?i)Integrated loudness:\s*{NUM}\s*LUFS")),
            ],
            range: vec![
                re(&format!(r"(?i)\bLRA:\s*{NUM}\s*LU\b")),
                re(&format!(r"(?i)Loudness range:\s*{NUM}\s*LU\b")),
            ],
            true_peak: vec![
                re(&format!(r"(?i)True peak:\s*{NUM}\s*dBTP")),
                re(&format!(r"(?i)True peak:\s*{NUM}\s*dBFS")),
                re(&format!(r"(?i)\bTP:\s*{NUM}\s*dB(?:TP|FS)")),
                re(&format!(r"(?i)\bPeak:\s*{NUM}\s*dB(?:TP|FS)")),
            ],
            loudnorm_i: re(&format!(r#""input_i"\s*:\s*"{NUM}""#)),
            loudnorm_tp: re(&format!(r#""input_tp"\s*:\s*"{NUM}""#)),
            loudnorm_lra: re(&format!(r#""input_lra"\s*:\s*"{NUM}""#)),
        }
    })
}

/// Last match wins: ffmpeg prints running values before the summary block.
fn last_capture(patterns: &[Regex], text: &str) -> Option<f64> {
    patterns.iter().find_map(|re| {
        re.captures_iter(text)
            .last()
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

fn plausible_lufs(lufs: f64) -> bool {
    lufs >= PLAUSIBLE_LUFS.0 && lufs <= PLAUSIBLE_LUFS.1
}

/// Parse the `ebur128` filter summary from ffmpeg stderr. Integrated loudness
/// outside [-50, 0] LUFS is discarded.
pub fn parse_ebur128(stderr: &str) -> Loudness {
    let text = stderr.replace('\u{2212}', "-");
    let p = patterns();

    Loudness {
        lufs_integrated: last_capture(&p.integrated, &text).filter(|&v| plausible_lufs(v)),
        loudness_range: last_capture(&p.range, &text),
        true_peak_db: last_capture(&p.true_peak, &text),
    }
}

/// Parse the JSON block printed by `loudnorm=print_format=json`.
pub fn parse_loudnorm(stderr: &str) -> Loudness {
    let text = stderr.replace('\u{2212}', "-");
    let p = patterns();
    let capture = |re: &Regex| {
        re.captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    Loudness {
        lufs_integrated: capture(&p.loudnorm_i).filter(|&v| plausible_lufs(v)),
        loudness_range: capture(&p.loudnorm_lra),
        true_peak_db: capture(&p.loudnorm_tp),
    }
}

/// Prefer the fallback pass, keeping ebur128 values it could not supply.
fn merge_loudnorm(primary: Loudness, fallback: Loudness) -> Loudness {
    Loudness {
        lufs_integrated: fallback.lufs_integrated,
        loudness_range: fallback.loudness_range.or(primary.loudness_range),
        true_peak_db: fallback.true_peak_db.or(primary.true_peak_db),
    }
}

/// Convert little-endian 32-bit float PCM to samples.
pub fn samples_from_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn probe_json_with_string_numbers() {
        let json = br#"{
            "streams": [
                {"index": 0, "codec_type": "video", "codec_name": "mjpeg"},
                {"index": 1, "codec_type": "audio", "codec_name": "mp3",
                 "sample_rate": "44100", "channels": 2}
            ],
            "format": {"duration": "215.327347", "bit_rate": "320000"}
        }"#;
        let meta = parse_probe_json(json).unwrap();
        assert_eq!(
            meta,
            TrackMetadata {
                duration_sec: 215.327347,
                bit_rate: 320_000,
                sample_rate: 44_100,
                channels: 2,
                codec: "mp3".to_string(),
            }
        );
    }

    #[test]
    fn probe_json_without_audio_stream() {
        let meta = parse_probe_json(br#"{"format": {"duration": 12.5}}"#).unwrap();
        assert_eq!(meta.duration_sec, 12.5);
        assert_eq!(meta.sample_rate, 0);
        assert_eq!(meta.codec, "unknown");
    }

    #[test]
    fn probe_json_garbage() {
        assert!(matches!(
            parse_probe_json(b"not json"),
            Err(MediaError::Malformed(_))
        ));
    }

    const EBUR128_SUMMARY: &str = "\
[Parsed_ebur128_0 @ 0x55d] t: 9.6  TARGET:-23 LUFS    M: -12.1 S: -13.0     I: -15.2 LUFS       LRA:   3.1 LU  FTPK: -1.0 dBFS  TPK: -0.9 dBFS
[Parsed_ebur128_0 @ 0x55d] Summary:

  Integrated loudness:
    I:         \u{2212}14.3 LUFS
    Threshold: -24.5 LUFS

  Loudness range:
    LRA:         6.2 LU
    Threshold: -34.6 LUFS
    LRA low:   -19.1 LUFS
    LRA high:  -12.9 LUFS

  True peak:
    Peak:       -0.4 dBFS
";

    #[test]
    fn ebur128_summary_wins_over_running_values() {
        let loudness = parse_ebur128(EBUR128_SUMMARY);
        assert_eq!(loudness.lufs_integrated, Some(-14.3));
        assert_eq!(loudness.loudness_range, Some(6.2));
        assert_eq!(loudness.true_peak_db, Some(-0.4));
    }

    #[test]
    fn implausible_integrated_loudness_is_dropped() {
        let loudness = parse_ebur128("I: -70.0 LUFS\nLRA: 0.0 LU\n");
        assert_eq!(loudness.lufs_integrated, None);
        assert_eq!(loudness.loudness_range, Some(0.0));
    }

    #[test]
    fn loudnorm_json_block() {
        let stderr = r#"[Parsed_loudnorm_0 @ 0x1]
{
    "input_i" : "-16.52",
    "input_tp" : "-1.23",
    "input_lra" : "7.40",
    "input_thresh" : "-26.80"
}"#;
        let loudness = parse_loudnorm(stderr);
        assert_eq!(loudness.lufs_integrated, Some(-16.52));
        assert_eq!(loudness.true_peak_db, Some(-1.23));
        assert_eq!(loudness.loudness_range, Some(7.4));
    }

    #[test]
    fn fallback_keeps_primary_peak() {
        let primary = Loudness {
            lufs_integrated: None,
            loudness_range: Some(4.0),
            true_peak_db: Some(-0.5),
        };
        let fallback = Loudness {
            lufs_integrated: Some(-18.0),
            loudness_range: None,
            true_peak_db: None,
        };
        let merged = merge_loudnorm(primary, fallback);
        assert_eq!(merged.lufs_integrated, Some(-18.0));
        assert_eq!(merged.loudness_range, Some(4.0));
        assert_eq!(merged.true_peak_db, Some(-0.5));
    }

    #[test]
    fn f32_conversion() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(0);
        assert_eq!(samples_from_f32le(&bytes), vec![0.25, -1.0]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let tool = Ffmpeg::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let err = tool
            .probe_metadata(Path::new("track.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Spawn { .. }), "{err}");
    }
}
