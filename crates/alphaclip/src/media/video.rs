//! Packed video pre-decode via ffmpeg subprocess (feature-gated behind `video`).
//!
//! - `ffprobe` probes metadata (dimensions, fps, duration)
//! - `ffmpeg -f rawvideo -pix_fmt rgba` decodes ALL frames to memory in one pass
//! - RAM cost: a 512x256 packed clip is 512KB per frame, ~450MB for 30s@30fps.

use std::io::Read;
use std::process::{Command, Stdio};

use super::decoder::MediaSource;
use super::types::{DecodedFrame, LoadCancel};
use crate::settings::MediaConfig;

/// Video metadata from ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
}

/// Probe a local path or URL with ffprobe.
pub fn probe_video(config: &MediaConfig, uri: &str) -> Result<VideoMeta, String> {
    let output = Command::new(&config.ffprobe_bin)
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(uri)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| format!("ffprobe failed to execute: {e}"))?;

    if !output.status.success() {
        return Err(format!("ffprobe could not read {uri}"));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoMeta, String> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| format!("Failed to parse ffprobe JSON: {e}"))?;

    let streams = json["streams"]
        .as_array()
        .ok_or("No streams in ffprobe output")?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or("No video stream found")?;

    let width = video_stream["width"].as_u64().ok_or("Missing width")? as u32;
    let height = video_stream["height"].as_u64().ok_or("Missing height")? as u32;

    let fps = parse_frame_rate(video_stream["r_frame_rate"].as_str().unwrap_or("30/1"));

    let duration_secs = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| {
            video_stream["duration"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    Ok(VideoMeta {
        width,
        height,
        fps,
        duration_secs,
    })
}

fn parse_frame_rate(rate: &str) -> f64 {
    if let Some((num, den)) = rate.split_once('/') {
        let n: f64 = num.parse().unwrap_or(30.0);
        let d: f64 = den.parse().unwrap_or(1.0);
        if d > 0.0 && n > 0.0 { n / d } else { 30.0 }
    } else {
        rate.parse().ok().filter(|r: &f64| *r > 0.0).unwrap_or(30.0)
    }
}

/// Probe and pre-decode a packed video into timed RGBA frames.
pub fn load_video(
    config: &MediaConfig,
    uri: &str,
    cancel: &LoadCancel,
) -> Result<MediaSource, String> {
    let meta = probe_video(config, uri)?;
    if meta.duration_secs > config.max_predecode_secs {
        return Err(format!(
            "{uri} is {:.1}s long, over the {:.0}s pre-decode limit",
            meta.duration_secs, config.max_predecode_secs
        ));
    }
    if cancel.is_cancelled() {
        return Err(format!("{uri}: load cancelled"));
    }
    let (frames, delays_ms) = decode_all_frames(config, uri, &meta, cancel)?;
    Ok(MediaSource::Animated { frames, delays_ms })
}

/// Pre-decode all video frames via a single ffmpeg run.
/// ffmpeg is killed as soon as `cancel` is set.
fn decode_all_frames(
    config: &MediaConfig,
    uri: &str,
    meta: &VideoMeta,
    cancel: &LoadCancel,
) -> Result<(Vec<DecodedFrame>, Vec<u32>), String> {
    let frame_size = (meta.width as usize) * (meta.height as usize) * 4;
    if frame_size == 0 {
        return Err(format!("{uri} has an empty video stream"));
    }
    let delay_ms = (1000.0 / meta.fps).round() as u32;

    let est_frames = (meta.duration_secs * meta.fps).ceil() as usize;
    log::info!(
        "Pre-decoding packed video: ~{} frames, ~{}MB RAM",
        est_frames,
        (est_frames * frame_size) / (1024 * 1024),
    );

    let mut child = Command::new(&config.ffmpeg_bin)
        .args(["-i", uri])
        .args([
            "-an",
            "-f", "rawvideo",
            "-pix_fmt", "rgba",
            "-s", &format!("{}x{}", meta.width, meta.height),
            "-v", "quiet",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("Failed to spawn ffmpeg: {e}"))?;

    let mut stdout = child.stdout.take().ok_or("ffmpeg: no stdout pipe")?;

    let mut frames = Vec::with_capacity(est_frames);
    let mut delays_ms = Vec::with_capacity(est_frames);
    let mut buf = vec![0u8; frame_size];

    while stdout.read_exact(&mut buf).is_ok() {
        if cancel.is_cancelled() {
            drop(stdout);
            let _ = child.kill();
            let _ = child.wait();
            log::debug!("{uri}: decode cancelled after {} frames", frames.len());
            return Err(format!("{uri}: load cancelled"));
        }
        frames.push(DecodedFrame {
            data: buf.clone(),
            width: meta.width,
            height: meta.height,
        });
        delays_ms.push(delay_ms.max(1));
    }

    let status = child.wait().map_err(|e| format!("ffmpeg wait failed: {e}"))?;

    if frames.is_empty() {
        return Err(format!("ffmpeg decoded zero frames ({status})"));
    }

    log::info!(
        "Decoded {} packed frames ({}MB)",
        frames.len(),
        (frames.len() * frame_size) / (1024 * 1024),
    );

    Ok((frames, delays_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_fraction() {
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), 25.0);
        assert_eq!(parse_frame_rate("0/0"), 30.0);
        assert_eq!(parse_frame_rate("garbage"), 30.0);
    }

    #[test]
    fn probe_json_picks_video_stream() {
        let json = br#"{
            "streams": [
                { "codec_type": "audio" },
                { "codec_type": "video", "width": 256, "height": 128, "r_frame_rate": "24/1" }
            ],
            "format": { "duration": "2.5" }
        }"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!(
            meta,
            VideoMeta {
                width: 256,
                height: 128,
                fps: 24.0,
                duration_secs: 2.5,
            }
        );
    }

    #[test]
    fn probe_json_without_video_is_an_error() {
        let json = br#"{ "streams": [ { "codec_type": "audio" } ], "format": {} }"#;
        assert!(parse_probe_output(json).is_err());
    }

    #[test]
    fn missing_ffprobe_reports_error() {
        let config = MediaConfig {
            ffprobe_bin: "/nonexistent/ffprobe-binary".into(),
            ..MediaConfig::default()
        };
        let err = probe_video(&config, "clip.mp4").unwrap_err();
        assert!(err.contains("ffprobe failed to execute"));
    }

    // `yes` stands in for an ffmpeg that never stops writing.
    #[cfg(unix)]
    #[test]
    fn cancelled_decode_kills_ffmpeg() {
        let config = MediaConfig {
            ffmpeg_bin: "yes".into(),
            ..MediaConfig::default()
        };
        let meta = VideoMeta {
            width: 1,
            height: 1,
            fps: 30.0,
            duration_secs: 1.0,
        };
        let cancel = LoadCancel::default();
        cancel.cancel();
        let err = decode_all_frames(&config, "clip.mp4", &meta, &cancel).unwrap_err();
        assert!(err.contains("cancelled"));
    }
}
