// File: args.rs
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Builds a DASH manifest for a yt-dlp result with separate audio and video \
                  streams and serves it once on a loopback URL."
)]
pub struct Args {
    /// yt-dlp info JSON (`yt-dlp -J`), or `-` for stdin
    #[arg(short, long, default_value = "-")]
    pub info_json: String,
    /// format_id of the audio format, instead of the one in requested_formats
    #[arg(short, long)]
    pub audio_format: Option<String>,
    /// format_id of the video format, instead of the one in requested_formats
    #[arg(short, long)]
    pub video_format: Option<String>,
    /// Seconds allowed for each range request
    #[arg(short, long, default_value_t = 10)]
    pub fetch_timeout: u64,
    // Set the log level (possible values: error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

pub fn get_log_level_filter(args: &Args) -> LevelFilter {
    match args.log_level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["dash-resolver"]).unwrap();
        assert_eq!(args.info_json, "-");
        assert_eq!(args.fetch_timeout, 10);
        assert_eq!(get_log_level_filter(&args), LevelFilter::INFO);
        assert!(args.audio_format.is_none());
    }

    #[test]
    fn explicit_formats_and_level() {
        let args = Args::try_parse_from([
            "dash-resolver",
            "--info-json",
            "info.json",
            "--audio-format",
            "251",
            "--video-format",
            "248",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.audio_format.as_deref(), Some("251"));
        assert_eq!(args.video_format.as_deref(), Some("248"));
        assert_eq!(get_log_level_filter(&args), LevelFilter::DEBUG);
    }
}
