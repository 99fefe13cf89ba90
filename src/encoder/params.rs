use url::Url;

use crate::error::AppError;

use super::options::{Backend, EncoderOptions};

const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";
const DEFAULT_GST_LAUNCH_BIN: &str = "gst-launch-1.0";

const AUDIO_BITRATE: &str = "160000";
const SRT_BLOCKSIZE: u64 = 1024 * 1024;

/// Executables used for each backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub gst_launch: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: DEFAULT_FFMPEG_BIN.to_string(),
            gst_launch: DEFAULT_GST_LAUNCH_BIN.to_string(),
        }
    }
}

impl ToolPaths {
    pub fn program_for(&self, backend: Backend) -> &str {
        match backend {
            Backend::Ffmpeg => &self.ffmpeg,
            Backend::Gstreamer => &self.gst_launch,
        }
    }
}

/// Fully resolved external process call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

pub fn build_invocation(
    source: &str,
    destination: &str,
    options: &EncoderOptions,
    backend: Backend,
    tools: &ToolPaths,
) -> Result<Invocation, AppError> {
    options.validate()?;

    let source_url = Url::parse(source)
        .map_err(|err| AppError::invalid_options(format!("invalid source url: {err}")))?;
    let destination_url = Url::parse(destination)
        .map_err(|err| AppError::invalid_options(format!("invalid destination url: {err}")))?;

    let ingest = srt_ingest_url(source_url, options);
    let args = match backend {
        Backend::Ffmpeg => ffmpeg_args(&ingest, destination_url.as_str(), options),
        Backend::Gstreamer => gst_args(&ingest, destination_url.as_str(), options),
    };

    Ok(Invocation {
        program: tools.program_for(backend).to_string(),
        args,
        env: vec![
            ("SRT_URL".to_string(), ingest),
            ("RTMP_URL".to_string(), destination_url.to_string()),
        ],
    })
}

fn srt_ingest_url(mut url: Url, options: &EncoderOptions) -> String {
    url.query_pairs_mut()
        .append_pair(
            "recv_buffer_size",
            &options.receive_buffer_bytes().to_string(),
        )
        .append_pair("snddropdelay", &options.drop_delay_micros().to_string());
    url.to_string()
}

fn ffmpeg_args(ingest: &str, destination: &str, options: &EncoderOptions) -> Vec<String> {
    let x264opts = format!(
        "nal-hrd=cbr:bframes={}:keyint={}:no-scenecut",
        options.bframes,
        options.keyframe_interval()
    );

    [
        "-hide_banner".to_string(),
        "-re".to_string(),
        "-i".to_string(),
        ingest.to_string(),
        "-ar".to_string(),
        options.audio_sampling_rate.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-x264opts".to_string(),
        x264opts,
        "-preset".to_string(),
        options.preset.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        "-b:v".to_string(),
        format!("{}k", options.video_bitrate),
        "-bufsize".to_string(),
        format!("{}k", options.effective_buffer_size()),
        "-filter:v".to_string(),
        format!("fps={}", options.frame_rate),
        "-f".to_string(),
        "flv".to_string(),
        destination.to_string(),
    ]
    .into()
}

fn gst_args(ingest: &str, destination: &str, options: &EncoderOptions) -> Vec<String> {
    // x264enc takes the VBV buffer as milliseconds of video at the target rate.
    let vbv_ms = options.effective_buffer_size() * 1000 / u64::from(options.video_bitrate);

    let pipeline = [
        "srtsrc".to_string(),
        format!("uri={ingest}"),
        format!("blocksize={SRT_BLOCKSIZE}"),
        "mode=caller".to_string(),
        "auto-reconnect=false".to_string(),
        "!".to_string(),
        "tsdemux".to_string(),
        "!".to_string(),
        "queue".to_string(),
        "!".to_string(),
        "decodebin".to_string(),
        "name=src".to_string(),
        "src.".to_string(),
        "!".to_string(),
        "queue".to_string(),
        "!".to_string(),
        "videoconvert".to_string(),
        "!".to_string(),
        "videorate".to_string(),
        "!".to_string(),
        format!("video/x-raw,framerate={}/1", options.frame_rate),
        "!".to_string(),
        "x264enc".to_string(),
        format!("speed-preset={}", options.preset),
        format!("bframes={}", options.bframes),
        format!("key-int-max={}", options.keyframe_interval()),
        format!("bitrate={}", options.video_bitrate),
        format!("vbv-buf-capacity={vbv_ms}"),
        "!".to_string(),
        "video/x-h264,profile=main".to_string(),
        "!".to_string(),
        "mux.".to_string(),
        "src.".to_string(),
        "!".to_string(),
        "queue".to_string(),
        "!".to_string(),
        "audioconvert".to_string(),
        "!".to_string(),
        "audioresample".to_string(),
        "!".to_string(),
        format!(
            "audio/x-raw,rate={},channels=2",
            options.audio_sampling_rate
        ),
        "!".to_string(),
        "faac".to_string(),
        format!("bitrate={AUDIO_BITRATE}"),
        "!".to_string(),
        "queue".to_string(),
        "!".to_string(),
        "flvmux".to_string(),
        "name=mux".to_string(),
        "streamable=true".to_string(),
        "!".to_string(),
        "queue".to_string(),
        "!".to_string(),
        "rtmpsink".to_string(),
        format!("location={destination}"),
    ];

    pipeline.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_url_keeps_existing_query() {
        let url = Url::parse("srt://host:9000?streamid=abc").unwrap();
        let ingest = srt_ingest_url(url, &EncoderOptions::default());
        assert_eq!(
            ingest,
            "srt://host:9000?streamid=abc&recv_buffer_size=1048576&snddropdelay=2000000"
        );
    }

    #[test]
    fn vbv_capacity_tracks_buffer_ratio() {
        let options = EncoderOptions {
            video_bitrate: 3_000,
            buffer_size: Some(1_500),
            ..EncoderOptions::default()
        };
        let args = gst_args("srt://h:1", "rtmp://h/live", &options);
        assert!(args.iter().any(|arg| arg == "vbv-buf-capacity=500"));
    }
}
