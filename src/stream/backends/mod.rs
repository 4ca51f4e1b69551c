pub mod ffmpeg;
pub mod http;

pub use ffmpeg::FfmpegBackend;
pub use http::HttpBackend;
