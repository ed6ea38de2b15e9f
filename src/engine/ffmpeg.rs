//! ffmpeg argument construction and progress parsing.

use super::ResizeConfig;
use aether_common::{AudioFormat, BackgroundColor, ImageFormat, OutputFormat, ResizeMode, VideoFormat};
use std::ffi::OsString;
use std::path::Path;

/// Everything needed to build one encode invocation.
#[derive(Debug, Clone)]
pub(crate) struct EncodeJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub format: OutputFormat,
    pub quality: u8,
    pub resize: Option<&'a ResizeConfig>,
    pub muted: bool,
    pub strip_metadata: bool,
    pub overwrite: bool,
    pub max_bitrate: Option<u32>,
}

#[derive(Debug, Default)]
struct ArgList(Vec<OsString>);

impl ArgList {
    fn flag(&mut self, flag: &str) -> &mut Self {
        self.0.push(flag.into());
        self
    }

    fn opt(&mut self, key: &str, value: impl AsRef<std::ffi::OsStr>) -> &mut Self {
        self.0.push(key.into());
        self.0.push(value.as_ref().to_owned());
        self
    }

    fn finish(&mut self, output: &Path) -> Vec<OsString> {
        self.0.push(output.as_os_str().to_owned());
        std::mem::take(&mut self.0)
    }
}

/// Build the argument list for `job`, dispatching on the output family.
pub(crate) fn encode_args(job: &EncodeJob<'_>) -> Vec<OsString> {
    match job.format {
        OutputFormat::Video(format) => video_args(job, format),
        OutputFormat::Audio(format) => audio_args(job, format),
        OutputFormat::Image(format) => image_args(job, format),
    }
}

fn common_prefix(job: &EncodeJob<'_>, progress: bool) -> ArgList {
    let mut args = ArgList::default();
    args.opt("-i", job.input);
    if progress {
        args.opt("-progress", "pipe:2");
    }
    args.flag(if job.overwrite { "-y" } else { "-n" });
    args
}

fn video_args(job: &EncodeJob<'_>, format: VideoFormat) -> Vec<OsString> {
    let mut args = common_prefix(job, true);
    if job.strip_metadata {
        args.opt("-map_metadata", "-1").opt("-map_chapters", "-1");
    }
    if job.muted {
        args.flag("-an");
    }
    args.flag("-ignore_unknown").opt("-map", "0:v:0");
    if !job.muted {
        args.opt("-map", "0:a:0?");
    }
    if let Some(resize) = job.resize {
        args.opt("-vf", resize_filter(resize, job.format, true));
    }

    let crf = video_crf(format, job.quality).to_string();
    let audio_bitrate = format!("{}k", audio_bitrate_kbps(job.quality));

    match format {
        VideoFormat::Webm => {
            args.opt("-c:v", "libvpx-vp9");
            if !job.muted {
                args.opt("-c:a", "libopus").opt("-b:a", &audio_bitrate);
            }
            args.opt("-crf", &crf);
            match job.max_bitrate {
                Some(max) => {
                    args.opt("-b:v", format!("{max}k"))
                        .opt("-maxrate", format!("{max}k"))
                        .opt("-bufsize", format!("{}k", max * 5));
                }
                None => {
                    args.opt("-b:v", "0");
                }
            }
            args.opt("-deadline", "good")
                .opt("-cpu-used", "2")
                .opt("-row-mt", "1")
                .opt("-pix_fmt", "yuv420p");
        }
        VideoFormat::Mp4 | VideoFormat::Mkv | VideoFormat::Mov => {
            args.opt("-c:v", "libx264");
            if !job.muted {
                args.opt("-c:a", "aac").opt("-b:a", &audio_bitrate);
            }
            args.opt("-crf", &crf).opt("-preset", x264_preset(job.quality));
            if format != VideoFormat::Mkv {
                args.opt("-movflags", "+faststart");
            }
            args.opt("-pix_fmt", "yuv420p");
            if let Some(max) = job.max_bitrate {
                args.opt("-maxrate", format!("{max}k"))
                    .opt("-bufsize", format!("{}k", max * 5));
            }
        }
    }

    args.finish(job.output)
}

fn audio_args(job: &EncodeJob<'_>, format: AudioFormat) -> Vec<OsString> {
    let mut args = common_prefix(job, true);
    if job.strip_metadata {
        args.opt("-map_metadata", "-1");
    }
    args.flag("-vn");

    let q = f32::from(job.quality) / 100.0;
    match format {
        AudioFormat::Mp3 => {
            let vbr = ((1.0 - q) * 9.0).round() as u8;
            args.opt("-c:a", "libmp3lame").opt("-q:a", vbr.min(9).to_string());
        }
        AudioFormat::Aac | AudioFormat::M4a => {
            args.opt("-c:a", "aac")
                .opt("-b:a", format!("{}k", audio_bitrate_kbps(job.quality)));
        }
        AudioFormat::Ogg => {
            let vbr = (q * 8.0).round() as u8;
            args.opt("-c:a", "libvorbis").opt("-q:a", vbr.clamp(1, 8).to_string());
        }
    }

    args.finish(job.output)
}

fn image_args(job: &EncodeJob<'_>, format: ImageFormat) -> Vec<OsString> {
    let mut args = common_prefix(job, false);
    if let Some(resize) = job.resize {
        args.opt("-vf", resize_filter(resize, job.format, false));
    }

    let q = f32::from(job.quality) / 100.0;
    match format {
        ImageFormat::Jpg => {
            let qscale = 31 - (q * 29.0) as u8;
            args.opt("-q:v", qscale.max(2).to_string());
        }
        ImageFormat::Webp => {
            let quality = 20 + u32::from(job.quality) * 72 / 100;
            args.opt("-quality", quality.min(92).to_string())
                .opt("-preset", "photo")
                .opt("-compression_level", "6");
        }
        ImageFormat::Png => {
            args.opt("-compression_level", "9");
        }
    }

    args.finish(job.output)
}

/// Single-frame JPEG preview 120 px wide. Video frames are taken at 1s.
pub(crate) fn thumbnail_args(input: &Path, output: &Path, seek: bool) -> Vec<OsString> {
    let mut args = ArgList::default();
    if seek {
        args.opt("-ss", "00:00:01");
    }
    args.opt("-i", input)
        .opt("-vframes", "1")
        .opt("-vf", "scale=120:-1")
        .flag("-y");
    args.finish(output)
}

fn resize_filter(resize: &ResizeConfig, format: OutputFormat, is_video: bool) -> String {
    // Encoders want even dimensions
    let w = resize.width / 2 * 2;
    let h = resize.height / 2 * 2;

    match resize.mode {
        ResizeMode::Fill => format!("scale={w}:{h}"),
        ResizeMode::Cover => {
            format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}")
        }
        ResizeMode::Contain => {
            let pad = format!("scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2");
            if resize.background_color == BackgroundColor::Transparent && format.supports_transparency() {
                let pix = if is_video { "yuva420p" } else { "rgba" };
                format!("format={pix},{pad}:color=0x00000000")
            } else {
                let color = match resize.background_color {
                    BackgroundColor::White => "white",
                    _ => "black",
                };
                format!("{pad}:color={color}")
            }
        }
    }
}

fn video_crf(format: VideoFormat, quality: u8) -> u8 {
    let q = f32::from(quality) / 100.0;
    match format {
        VideoFormat::Webm => (63.0 - q * 32.0).clamp(31.0, 63.0) as u8,
        _ => (51.0 - q * 28.0).clamp(23.0, 51.0) as u8,
    }
}

fn audio_bitrate_kbps(quality: u8) -> u32 {
    (64 + u32::from(quality) * 256 / 100).clamp(128, 320)
}

fn x264_preset(quality: u8) -> &'static str {
    match quality {
        80.. => "slow",
        50..=79 => "medium",
        _ => "fast",
    }
}

/// Total duration from ffmpeg's `Duration: HH:MM:SS.xx,` banner line.
pub(crate) fn parse_duration(line: &str) -> Option<f64> {
    let rest = &line[line.find("Duration: ")? + 10..];
    parse_timestamp(&rest[..rest.find(',')?])
}

/// Percentage from a `-progress` or status line, given the total duration.
pub(crate) fn parse_progress(line: &str, duration_secs: Option<f64>) -> Option<u8> {
    let total = duration_secs.filter(|d| *d > 0.0)?;

    let current = if let Some(us) = line.strip_prefix("out_time_us=") {
        us.trim().parse::<u64>().ok()? as f64 / 1_000_000.0
    } else if let Some(ts) = line.strip_prefix("out_time=") {
        parse_timestamp(ts.trim())?
    } else {
        let rest = &line[line.find("time=")? + 5..];
        parse_timestamp(rest.split(' ').next()?)?
    };

    Some(((current / total) * 100.0).clamp(0.0, 100.0) as u8)
}

fn parse_timestamp(ts: &str) -> Option<f64> {
    let mut parts = ts.split(':');
    let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(h.parse::<f64>().ok()? * 3600.0 + m.parse::<f64>().ok()? * 60.0 + s.parse::<f64>().ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job<'a>(input: &'a Path, output: &'a Path, format: OutputFormat) -> EncodeJob<'a> {
        EncodeJob {
            input,
            output,
            format,
            quality: 80,
            resize: None,
            muted: false,
            strip_metadata: false,
            overwrite: false,
            max_bitrate: None,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().to_string()).collect()
    }

    fn has_pair(args: &[String], key: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == key && w[1] == value)
    }

    #[test]
    fn test_mp4_args() {
        let (input, output) = (PathBuf::from("/in/a.mkv"), PathBuf::from("/out/a.mp4"));
        let mut j = job(&input, &output, OutputFormat::Video(VideoFormat::Mp4));
        j.max_bitrate = Some(4000);
        let args = strings(encode_args(&j));

        assert_eq!(args.first().map(String::as_str), Some("-i"));
        assert_eq!(args.last().map(String::as_str), Some("/out/a.mp4"));
        assert!(args.contains(&"-n".to_string()));
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-crf", "28"));
        assert!(has_pair(&args, "-preset", "slow"));
        assert!(has_pair(&args, "-maxrate", "4000k"));
        assert!(has_pair(&args, "-bufsize", "20000k"));
        assert!(has_pair(&args, "-map", "0:a:0?"));
    }

    #[test]
    fn test_muted_video_drops_audio() {
        let (input, output) = (PathBuf::from("a.mp4"), PathBuf::from("b.webm"));
        let mut j = job(&input, &output, OutputFormat::Video(VideoFormat::Webm));
        j.muted = true;
        j.overwrite = true;
        let args = strings(encode_args(&j));

        assert!(args.contains(&"-an".to_string()));
        assert!(args.contains(&"-y".to_string()));
        assert!(!args.iter().any(|a| a == "libopus"));
        assert!(has_pair(&args, "-b:v", "0"));
    }

    #[test]
    fn test_audio_args() {
        let (input, output) = (PathBuf::from("a.wav"), PathBuf::from("a.mp3"));
        let mut j = job(&input, &output, OutputFormat::Audio(AudioFormat::Mp3));
        j.strip_metadata = true;
        let args = strings(encode_args(&j));
        assert!(args.contains(&"-vn".to_string()));
        assert!(has_pair(&args, "-map_metadata", "-1"));
        assert!(has_pair(&args, "-q:a", "2"));
    }

    #[test]
    fn test_image_contain_transparent() {
        let (input, output) = (PathBuf::from("a.jpg"), PathBuf::from("a.png"));
        let resize = ResizeConfig {
            width: 801,
            height: 600,
            mode: ResizeMode::Contain,
            background_color: BackgroundColor::Transparent,
        };
        let mut j = job(&input, &output, OutputFormat::Image(ImageFormat::Png));
        j.resize = Some(&resize);
        let args = strings(encode_args(&j));

        let filter = args.iter().skip_while(|a| *a != "-vf").nth(1).unwrap();
        assert!(filter.starts_with("format=rgba,scale=800:600"));
        assert!(filter.ends_with("color=0x00000000"));
        assert!(!args.iter().any(|a| a == "-progress"));
    }

    #[test]
    fn test_jpg_transparent_falls_back_to_black() {
        let resize = ResizeConfig {
            width: 100,
            height: 100,
            mode: ResizeMode::Contain,
            background_color: BackgroundColor::Transparent,
        };
        let filter = resize_filter(&resize, OutputFormat::Image(ImageFormat::Jpg), false);
        assert!(filter.ends_with("color=black"));
    }

    #[test]
    fn test_quality_mappings() {
        assert_eq!(video_crf(VideoFormat::Mp4, 100), 23);
        assert_eq!(video_crf(VideoFormat::Mp4, 0), 51);
        assert_eq!(video_crf(VideoFormat::Webm, 50), 47);
        assert_eq!(audio_bitrate_kbps(0), 128);
        assert_eq!(audio_bitrate_kbps(100), 320);
        assert_eq!(x264_preset(60), "medium");
        assert_eq!(x264_preset(10), "fast");
    }

    #[test]
    fn test_progress_parsing() {
        assert_eq!(
            parse_duration("  Duration: 00:01:40.00, start: 0.000000, bitrate: 1000 kb/s"),
            Some(100.0)
        );
        assert_eq!(parse_progress("out_time_us=50000000", Some(100.0)), Some(50));
        assert_eq!(parse_progress("out_time=00:00:25.000000", Some(100.0)), Some(25));
        assert_eq!(
            parse_progress("frame=10 fps=0 time=00:01:30.00 bitrate=1k", Some(100.0)),
            Some(90)
        );
        assert_eq!(parse_progress("out_time_us=50000000", None), None);
        assert_eq!(parse_progress("speed=1.0x", Some(100.0)), None);
    }

    #[test]
    fn test_thumbnail_args() {
        let args = strings(thumbnail_args(Path::new("v.mp4"), Path::new("/tmp/t.jpg"), true));
        assert_eq!(args[..2], ["-ss".to_string(), "00:00:01".to_string()]);
        assert!(has_pair(&args, "-vf", "scale=120:-1"));

        let args = strings(thumbnail_args(Path::new("i.png"), Path::new("/tmp/t.jpg"), false));
        assert_eq!(args[0], "-i");
    }
}
