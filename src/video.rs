/*!
 * ffmpeg-backed video encoder.
 *
 * Every segment is rendered at the dimensions of a reference slide (the
 * first one, rounded down to even numbers for yuv420p). Slides of another
 * size are scaled to fit and padded. Outputs are written under a temporary
 * name and renamed into place, so an interrupted encode never leaves a file
 * that looks finished.
 */

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tokio::process::Command;

use crate::app_config::VideoConfig;
use crate::backends::VideoEncoder;
use crate::errors::PipelineError;

static VIDEO_STREAM_DIMENSIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Video:.*?\b(\d{2,5})x(\d{2,5})\b").unwrap()
});

static ANY_DIMENSIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2,5})x(\d{2,5})\b").unwrap());

/// Pixel size of an image or video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round both sides down to even numbers, as yuv420p requires
    pub fn even(self) -> Self {
        Self {
            width: self.width - self.width % 2,
            height: self.height - self.height % 2,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Extract the frame size from ffmpeg's stream description
pub fn parse_dimensions(ffmpeg_output: &str) -> Option<Dimensions> {
    let captures = VIDEO_STREAM_DIMENSIONS
        .captures(ffmpeg_output)
        .or_else(|| ANY_DIMENSIONS.captures(ffmpeg_output))?;
    let width = captures.get(1)?.as_str().parse().ok()?;
    let height = captures.get(2)?.as_str().parse().ok()?;
    Some(Dimensions::new(width, height))
}

/// `scale` + `pad` chain that letterboxes any image into `target`
pub fn fit_filter(target: Dimensions) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
        w = target.width,
        h = target.height
    )
}

/// `filter_complex` graph joining `count` inputs, video and audio, in input order
pub fn concat_filter(count: usize) -> String {
    let mut graph: String = (0..count).map(|i| format!("[{i}:v][{i}:a]")).collect();
    graph.push_str(&format!("concat=n={}:v=1:a=1[outv][outa]", count));
    graph
}

/// Temporary sibling of `output` that keeps its extension so ffmpeg picks the same muxer
fn partial_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}.partial.{}", stem, ext.to_string_lossy()),
        None => format!("{}.partial", stem),
    };
    output.with_file_name(name)
}

/// Filter ffmpeg stderr to only show meaningful error lines, stripping the
/// version banner, build configuration, and stream metadata noise.
pub fn filter_ffmpeg_stderr(stderr: &str) -> String {
    const NOISE_PREFIXES: &[&str] = &[
        "ffmpeg version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Stream #",
        "encoder",
        "major_brand",
        "minor_version",
        "compatible_brands",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "frame=",
        "size=",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !NOISE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown ffmpeg error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}

fn path_arg(path: &Path) -> OsString {
    path.as_os_str().to_os_string()
}

/// Renders slide segments and final videos with the ffmpeg CLI
#[derive(Debug)]
pub struct FfmpegEncoder {
    ffmpeg_path: String,
    timeout: Duration,
    reference: RwLock<Option<Dimensions>>,
}

impl FfmpegEncoder {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            reference: RwLock::new(None),
        }
    }

    /// Fix the output frame size instead of probing the first slide
    pub fn with_reference(self, dimensions: Dimensions) -> Self {
        *self.reference.write() = Some(dimensions.even());
        self
    }

    pub fn reference(&self) -> Option<Dimensions> {
        *self.reference.read()
    }

    async fn run(&self, args: Vec<OsString>, what: &str) -> Result<Output, PipelineError> {
        debug!("Running {} {:?}", self.ffmpeg_path, args);
        let ffmpeg_future = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = ffmpeg_future => result.map_err(|e| PipelineError::Encoding {
                message: format!("Failed to execute {} for {}: {}", self.ffmpeg_path, what, e),
            }),
            _ = tokio::time::sleep(self.timeout) => Err(PipelineError::Encoding {
                message: format!("ffmpeg {} timed out after {:?}", what, self.timeout),
            }),
        }
    }

    /// Read an image's size from ffmpeg's stream info
    pub async fn read_dimensions(&self, image: &Path) -> Result<Dimensions, PipelineError> {
        let args = vec![
            OsString::from("-hide_banner"),
            OsString::from("-i"),
            path_arg(image),
            OsString::from("-vf"),
            OsString::from("scale"),
            OsString::from("-vframes"),
            OsString::from("1"),
            OsString::from("-f"),
            OsString::from("null"),
            OsString::from("-"),
        ];
        let output = self.run(args, "dimensions").await?;
        let stderr = String::from_utf8_lossy(&output.stderr);

        parse_dimensions(&stderr).ok_or_else(|| PipelineError::Encoding {
            message: format!(
                "Could not read dimensions of {}: {}",
                image.display(),
                filter_ffmpeg_stderr(&stderr)
            ),
        })
    }

    /// Probe `slide` and use its even-rounded size as the output frame size
    pub async fn reference_dimensions(&self, slide: &Path) -> Result<Dimensions, PipelineError> {
        let dimensions = self.read_dimensions(slide).await?.even();
        info!("Rendering at {} (from {})", dimensions, slide.display());
        *self.reference.write() = Some(dimensions);
        Ok(dimensions)
    }

    async fn target_dimensions(&self, image: &Path) -> Result<Dimensions, PipelineError> {
        if let Some(dimensions) = self.reference() {
            return Ok(dimensions);
        }
        let measured = self.read_dimensions(image).await?.even();
        let mut reference = self.reference.write();
        Ok(*reference.get_or_insert(measured))
    }

    /// Run an encode into a partial file and move it over `output` on success
    async fn encode_into(&self, mut args: Vec<OsString>, output: &Path, what: &str) -> Result<PathBuf, PipelineError> {
        let partial = partial_path(output);
        args.push(OsString::from("-y"));
        args.push(path_arg(&partial));

        let result = self.run(args, what).await;
        let result = match result {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(PipelineError::Encoding {
                message: format!(
                    "ffmpeg {} for {} exited with {}: {}",
                    what,
                    output.display(),
                    out.status,
                    filter_ffmpeg_stderr(&String::from_utf8_lossy(&out.stderr))
                ),
            }),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        tokio::fs::rename(&partial, output)
            .await
            .map_err(|e| PipelineError::io(output, e))?;
        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn render_segment(&self, image: &Path, audio: &Path, output: &Path) -> Result<PathBuf, PipelineError> {
        let target = self.target_dimensions(image).await?;
        let native = self.read_dimensions(image).await?;

        let mut args = vec![
            OsString::from("-hide_banner"),
            OsString::from("-loop"),
            OsString::from("1"),
            OsString::from("-i"),
            path_arg(image),
            OsString::from("-i"),
            path_arg(audio),
        ];
        if native != target {
            debug!("Fitting {} ({}) into {}", image.display(), native, target);
            args.push(OsString::from("-vf"));
            args.push(OsString::from(fit_filter(target)));
        }
        for arg in [
            "-c:v", "libx264", "-tune", "stillimage", "-c:a", "mp3", "-b:a", "192k", "-pix_fmt", "yuv420p",
            "-shortest",
        ] {
            args.push(OsString::from(arg));
        }

        self.encode_into(args, output, "render").await
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf, PipelineError> {
        if inputs.is_empty() {
            return Err(PipelineError::Encoding {
                message: "Nothing to concatenate".to_string(),
            });
        }

        let mut args = vec![OsString::from("-hide_banner")];
        for input in inputs {
            args.push(OsString::from("-i"));
            args.push(path_arg(input));
        }
        args.push(OsString::from("-filter_complex"));
        args.push(OsString::from(concat_filter(inputs.len())));
        for arg in ["-map", "[outv]", "-map", "[outa]"] {
            args.push(OsString::from(arg));
        }

        info!("Concatenating {} segment(s) into {}", inputs.len(), output.display());
        self.encode_into(args, output, "concatenation").await
    }
}
