use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

/// Headless course video player: plays one video through the segment
/// loader and writes the fetched segments to a file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video to play: `<course>/<video>` or a legacy video name
    pub video: String,

    /// Base URL of the course video API
    #[arg(long, env = "COURSE_PLAYER_API_BASE")]
    pub api_base: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output file for the fetched segments
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rendition to play: `auto`, a level index, or a label such as `720p`
    #[arg(short, long, allow_hyphen_values = true)]
    pub level: Option<LevelArg>,

    /// Set and remember the volume for this video (0.0 - 1.0)
    #[arg(long)]
    pub volume: Option<f32>,

    /// JSON file holding per-video preferences
    #[arg(long)]
    pub preferences: Option<PathBuf>,

    /// Seconds of buffered media above which segment fetches are deferred
    #[arg(long)]
    pub preload_threshold: Option<f64>,

    /// Simulated playback rate
    #[arg(long)]
    pub rate: Option<f64>,

    /// Stop after this many segments
    #[arg(long)]
    pub max_segments: Option<usize>,

    /// Request the playlist as `<endpoint>?name=<video>`
    #[arg(long)]
    pub legacy_playlist: bool,

    /// Proxy URL (http, https or socks5)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Retries per request before giving up
    #[arg(long)]
    pub max_retry: Option<u32>,

    /// Directory for a daily rotated log file
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Rendition requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelArg {
    Auto,
    Index(usize),
    Label(String),
}

impl FromStr for LevelArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("level must not be empty".to_string());
        }
        if s.eq_ignore_ascii_case("auto") || s == "-1" {
            return Ok(Self::Auto);
        }
        Ok(match s.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Label(s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_level_forms() {
        assert_eq!("auto".parse::<LevelArg>().unwrap(), LevelArg::Auto);
        assert_eq!("-1".parse::<LevelArg>().unwrap(), LevelArg::Auto);
        assert_eq!("2".parse::<LevelArg>().unwrap(), LevelArg::Index(2));
        assert_eq!(
            "720p".parse::<LevelArg>().unwrap(),
            LevelArg::Label("720p".into())
        );
        assert!("".parse::<LevelArg>().is_err());
    }

    #[test]
    fn parses_command_line() {
        let args = Args::try_parse_from([
            "course-player",
            "algebra/intro-101",
            "--level",
            "720p",
            "--volume",
            "0.5",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.video, "algebra/intro-101");
        assert_eq!(args.level, Some(LevelArg::Label("720p".into())));
        assert_eq!(args.volume, Some(0.5));
        assert!(args.verbose);
    }
}
