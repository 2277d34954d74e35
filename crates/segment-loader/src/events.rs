use std::fmt;

use crate::resolution::AUTO_LEVEL;

/// One rendition as advertised by the master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelInfo {
    pub url: String,
    pub bandwidth: u64,
    pub height: Option<u64>,
    pub name: Option<String>,
}

impl LevelInfo {
    pub fn new(url: impl Into<String>, bandwidth: u64) -> Self {
        Self {
            url: url.into(),
            bandwidth,
            height: None,
            name: None,
        }
    }

    pub fn with_height(mut self, height: u64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Rendition label as used by the segment API, e.g. `720p`.
    ///
    /// Falls back to the playlist name, then to the bandwidth.
    pub fn label(&self) -> String {
        match (&self.height, &self.name) {
            (Some(height), _) => format!("{height}p"),
            (None, Some(name)) => name.clone(),
            (None, None) => format!("{}bps", self.bandwidth),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Network,
    Media,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub fatal: bool,
    pub kind: EngineErrorKind,
    pub details: String,
}

impl EngineError {
    pub fn fatal(kind: EngineErrorKind, details: impl Into<String>) -> Self {
        Self {
            fatal: true,
            kind,
            details: details.into(),
        }
    }

    pub fn non_fatal(kind: EngineErrorKind, details: impl Into<String>) -> Self {
        Self {
            fatal: false,
            kind,
            details: details.into(),
        }
    }
}

/// Events the playback engine emits and the player session consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    ManifestParsed { levels: Vec<LevelInfo> },
    LevelSwitched { level: usize },
    Error(EngineError),
}

/// What the engine should do after a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Restart loading from the current position.
    StartLoad,
    /// Run the engine's media-error recovery.
    RecoverMediaError,
    /// Give up and show this message to the user.
    Surface(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LevelSelection {
    #[default]
    Auto,
    Level(usize),
}

impl LevelSelection {
    /// Engine level index; `-1` means automatic.
    pub fn as_index(&self) -> i32 {
        match self {
            Self::Auto => AUTO_LEVEL,
            Self::Level(level) => i32::try_from(*level).unwrap_or(AUTO_LEVEL),
        }
    }

    pub fn from_index(index: i32) -> Self {
        usize::try_from(index).map_or(Self::Auto, Self::Level)
    }
}

impl fmt::Display for LevelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Level(level) => write!(f, "level {level}"),
        }
    }
}

/// Instructions the player session hands back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    SelectLevel(LevelSelection),
    Recover(RecoveryAction),
}
