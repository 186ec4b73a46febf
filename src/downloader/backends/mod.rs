// Tool backends

pub mod ffmpeg;
pub mod ytdlp;

pub use ffmpeg::FfmpegCopier;
pub use ytdlp::YtDlpBackend;
