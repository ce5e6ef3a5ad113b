use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use super::{DecodedFrame, FrameReader, VideoInfo, VideoSource};

/// [`VideoSource`] backed by the `ffprobe` and `ffmpeg` command-line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegSource;

impl VideoSource for FfmpegSource {
    fn probe(&self, path: &Path) -> Result<VideoInfo> {
        probe(path)
    }

    fn open_at_frame(&self, path: &Path, start_frame: u32) -> Result<Box<dyn FrameReader>> {
        let decoder = VideoDecoder::open_at_frame(path, start_frame)?;
        Ok(Box::new(decoder))
    }
}

fn run_ffprobe(path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(args)
        .args(["-of", "csv=p=0"])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("failed to run ffprobe, is ffmpeg installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(%stderr, ?path, "ffprobe failed");
        bail!("ffprobe failed: {stderr}");
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn probe(path: &Path) -> Result<VideoInfo> {
    info!(?path, "probing video metadata with ffprobe");

    // Output format: "width,height,num/den,nb_frames"
    let stdout = run_ffprobe(
        path,
        &["-show_entries", "stream=width,height,r_frame_rate,nb_frames"],
    )?;
    let parts: Vec<&str> = stdout.split(',').collect();
    if parts.len() < 4 {
        error!(%stdout, "unexpected ffprobe output format, expected width,height,fps,nb_frames");
        bail!("unexpected ffprobe output: {stdout}");
    }

    let width: u32 = parts[0].parse().context("failed to parse width")?;
    let height: u32 = parts[1].parse().context("failed to parse height")?;
    let fps = parse_frame_rate(parts[2])?;

    if fps <= 0.0 {
        warn!(fps, ?path, "video has non-positive fps, timestamps will be 0");
    }

    let frame_count = match parts[3].trim().parse::<u32>() {
        Ok(n) => n,
        Err(_) => {
            // Some containers do not carry a frame count; count packets instead.
            debug!(?path, nb_frames = parts[3], "nb_frames unavailable, counting packets");
            let counted = run_ffprobe(
                path,
                &["-count_packets", "-show_entries", "stream=nb_read_packets"],
            )?;
            counted
                .parse()
                .with_context(|| format!("failed to parse packet count {counted:?}"))?
        }
    };

    if width == 0 || height == 0 {
        bail!("invalid video dimensions: {width}x{height}");
    }

    info!(width, height, fps, frame_count, "probe completed");
    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
    })
}

fn parse_frame_rate(raw: &str) -> Result<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.parse().context("failed to parse fps numerator")?;
        let den: f64 = den.parse().context("failed to parse fps denominator")?;
        Ok(if den > 0.0 { num / den } else { 0.0 })
    } else {
        raw.parse().context("failed to parse fps")
    }
}

/// Decodes video frames by piping raw RGB24 data from the ffmpeg CLI.
pub struct VideoDecoder {
    child: Child,
    width: u32,
    height: u32,
    fps: f64,
    next_frame_number: u32,
    frame_bytes: usize,
}

impl VideoDecoder {
    /// Open a video file so that the first decoded frame is `start_frame`.
    pub fn open_at_frame(path: &Path, start_frame: u32) -> Result<Self> {
        if !path.exists() {
            bail!("video file does not exist: {}", path.display());
        }

        let info = probe(path)?;

        info!(?path, start_frame, "spawning ffmpeg decoder process");

        let mut command = Command::new("ffmpeg");
        command.args(["-v", "error", "-i"]).arg(path);
        if start_frame > 0 {
            // Frame-accurate positioning; `-ss` would land on the nearest keyframe.
            command
                .arg("-vf")
                .arg(format!("select=gte(n\\,{start_frame})"));
        }
        let child = command
            .args([
                "-fps_mode", "passthrough",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "pipe:1",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn ffmpeg, is ffmpeg installed?")?;

        let frame_bytes = (info.width as usize) * (info.height as usize) * 3;

        debug!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            frame_bytes,
            "video decoder opened"
        );

        Ok(Self {
            child,
            width: info.width,
            height: info.height,
            fps: info.fps,
            next_frame_number: start_frame,
            frame_bytes,
        })
    }

    fn timestamp_ms(&self, frame_number: u32) -> f64 {
        if self.fps > 0.0 {
            frame_number as f64 * 1000.0 / self.fps
        } else {
            0.0
        }
    }
}

impl FrameReader for VideoDecoder {
    /// Read the next frame from the ffmpeg pipe, or `None` if the video is finished.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .context("ffmpeg stdout not available")?;

        let mut buf = vec![0u8; self.frame_bytes];
        let mut read = 0;

        while read < self.frame_bytes {
            match stdout.read(&mut buf[read..]) {
                Ok(0) => {
                    if read == 0 {
                        debug!(next_frame = self.next_frame_number, "video stream ended");
                        return Ok(None);
                    }
                    let frame = self.next_frame_number;
                    self.next_frame_number += 1;
                    bail!(
                        "ffmpeg stream ended mid-frame {frame} (read {read}/{} bytes)",
                        self.frame_bytes,
                    );
                }
                Ok(n) => read += n,
                Err(e) => {
                    let frame = self.next_frame_number;
                    self.next_frame_number += 1;
                    return Err(e)
                        .with_context(|| format!("failed to read frame {frame} from ffmpeg pipe"));
                }
            }
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .context("failed to create RgbImage from raw frame data")?;

        let frame_number = self.next_frame_number;
        let timestamp_ms = self.timestamp_ms(frame_number);
        self.next_frame_number += 1;

        debug!(frame_number, timestamp_ms, "decoded frame");

        Ok(Some(DecodedFrame {
            image,
            timestamp_ms,
        }))
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        debug!(next_frame = self.next_frame_number, "closing video decoder");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_frame_rate() {
        let fps = parse_frame_rate("30000/1001").unwrap();
        assert!((fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn zero_denominator_yields_zero_fps() {
        assert_eq!(parse_frame_rate("25/0").unwrap(), 0.0);
    }

    #[test]
    fn parses_plain_frame_rate() {
        assert_eq!(parse_frame_rate("60").unwrap(), 60.0);
        assert!(parse_frame_rate("fast").is_err());
    }

    #[test]
    fn open_missing_file_fails_without_spawning() {
        let err = VideoDecoder::open_at_frame(Path::new("/definitely/not/here.mp4"), 0)
            .err()
            .expect("missing file must be rejected");
        assert!(err.to_string().contains("does not exist"));
    }
}
