// Resolution state: which rendition the player wants, which one the engine is
// playing, and which ones the manifest advertised.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::LoaderError;
use crate::identity::VideoIdentity;
use crate::store::PreferenceStore;

/// Level index meaning "let the engine choose".
pub const AUTO_LEVEL: i32 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Resolution {
    #[default]
    Auto,
    Fixed(String),
}

impl Resolution {
    pub fn fixed(label: impl Into<String>) -> Self {
        Self::Fixed(label.into())
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::Fixed(label) => Some(label),
        }
    }
}

impl From<&str> for Resolution {
    fn from(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("auto") {
            Self::Auto
        } else {
            Self::Fixed(value.to_owned())
        }
    }
}

impl From<String> for Resolution {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("Auto"),
            Self::Fixed(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionState {
    selected: Resolution,
    active: Option<String>,
    available: Vec<String>,
}

impl ResolutionState {
    /// The rendition explicitly requested by the player, or `Auto`.
    pub fn selected(&self) -> &Resolution {
        &self.selected
    }

    /// The rendition the engine last confirmed it switched to.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Renditions advertised by the manifest, in manifest order.
    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.available.iter().position(|l| l == label)
    }

    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.available.get(index).map(String::as_str)
    }

    pub fn is_advertised(&self, label: &str) -> bool {
        self.available.iter().any(|l| l == label)
    }
}

/// Shared handle to the single resolution state of one player.
///
/// The player session and every loader built for it hold clones of the same
/// handle, so a change made by either side is seen by the other.
#[derive(Debug, Clone, Default)]
pub struct ResolutionHandle {
    inner: Arc<RwLock<ResolutionState>>,
}

impl ResolutionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a rendition. Returns whether the selection changed.
    pub fn set_resolution(&self, resolution: impl Into<Resolution>) -> bool {
        let resolution = resolution.into();
        let mut state = self.inner.write();
        if state.selected == resolution {
            return false;
        }
        debug!(from = %state.selected, to = %resolution, "Resolution selection changed");
        state.selected = resolution;
        true
    }

    /// Replace the advertised renditions. A selection or active level that is
    /// no longer advertised is dropped.
    pub fn set_available_resolutions(&self, available: Vec<String>) {
        let mut state = self.inner.write();

        if let Resolution::Fixed(label) = &state.selected
            && !available.contains(label)
        {
            warn!(
                resolution = %label,
                "Selected resolution is not advertised anymore; falling back to Auto"
            );
            state.selected = Resolution::Auto;
        }

        if let Some(active) = &state.active
            && !available.contains(active)
        {
            state.active = None;
        }

        debug!(available = ?available, "Available resolutions updated");
        state.available = available;
    }

    pub fn set_active(&self, label: Option<String>) {
        self.inner.write().active = label;
    }

    pub fn current(&self) -> Resolution {
        self.inner.read().selected.clone()
    }

    pub fn available(&self) -> Vec<String> {
        self.inner.read().available.clone()
    }

    pub fn snapshot(&self) -> ResolutionState {
        self.inner.read().clone()
    }
}

/// Per-video persisted rendition index and volume.
#[derive(Clone)]
pub struct ResolutionPreferences {
    identity: VideoIdentity,
    store: Arc<dyn PreferenceStore>,
}

impl fmt::Debug for ResolutionPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionPreferences")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ResolutionPreferences {
    pub fn new(identity: VideoIdentity, store: Arc<dyn PreferenceStore>) -> Self {
        Self { identity, store }
    }

    pub fn identity(&self) -> &VideoIdentity {
        &self.identity
    }

    pub fn save_level(&self, level: i32) -> Result<(), LoaderError> {
        self.store.set(&self.identity.resolution_key(), &level.to_string())
    }

    pub fn saved_level(&self) -> Option<i32> {
        let raw = self.store.get(&self.identity.resolution_key())?;
        match raw.trim().parse::<i32>() {
            Ok(level) => Some(level),
            Err(_) => {
                warn!(
                    identity = %self.identity,
                    value = %raw,
                    "Ignoring unparseable saved resolution"
                );
                None
            }
        }
    }

    /// The saved level if it is still a valid index into a list of `available` renditions.
    pub fn restore_level(&self, available: usize) -> Option<usize> {
        let level = self.saved_level()?;
        match usize::try_from(level) {
            Ok(index) if index < available => Some(index),
            _ => {
                debug!(
                    identity = %self.identity,
                    saved = level,
                    available,
                    "Saved resolution out of range; using automatic selection"
                );
                None
            }
        }
    }

    pub fn save_volume(&self, volume: f32) -> Result<(), LoaderError> {
        let volume = volume.clamp(0.0, 1.0);
        self.store
            .set(&self.identity.volume_key(), &volume.to_string())
    }

    pub fn restore_volume(&self) -> Option<f32> {
        let raw = self.store.get(&self.identity.volume_key())?;
        raw.trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
    }
}
