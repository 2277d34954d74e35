// Player session: the UI side of one mounted video. Reacts to engine events,
// keeps the shared resolution state in step with the engine and remembers the
// viewer's choices per video.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::LoaderError;
use crate::events::{
    EngineError, EngineErrorKind, LevelSelection, PlayerCommand, PlayerEvent, RecoveryAction,
};
use crate::identity::VideoIdentity;
use crate::resolution::{AUTO_LEVEL, Resolution, ResolutionHandle, ResolutionPreferences};
use crate::store::PreferenceStore;

/// Message shown when the engine reports an unrecoverable error.
pub const PLAYBACK_ERROR_MESSAGE: &str = "An error occurred while loading the video.";

/// Volume used when nothing was saved for the video.
pub const DEFAULT_VOLUME: f32 = 1.0;

#[derive(Debug)]
pub struct PlayerSession {
    resolution: ResolutionHandle,
    preferences: ResolutionPreferences,
    selection: LevelSelection,
    current_level: Option<usize>,
    error: Option<String>,
}

impl PlayerSession {
    pub fn new(
        identity: VideoIdentity,
        resolution: ResolutionHandle,
        store: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            resolution,
            preferences: ResolutionPreferences::new(identity, store),
            selection: LevelSelection::Auto,
            current_level: None,
            error: None,
        }
    }

    pub fn identity(&self) -> &VideoIdentity {
        self.preferences.identity()
    }

    pub fn resolution(&self) -> &ResolutionHandle {
        &self.resolution
    }

    pub fn selection(&self) -> LevelSelection {
        self.selection
    }

    /// Level the engine last reported switching to.
    pub fn current_level(&self) -> Option<usize> {
        self.current_level
    }

    /// User-visible error, once playback has given up.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// React to one engine event. The returned command, if any, goes back to
    /// the engine.
    pub fn handle_event(&mut self, event: PlayerEvent) -> Option<PlayerCommand> {
        match event {
            PlayerEvent::ManifestParsed { levels } => {
                let labels: Vec<String> = levels.iter().map(|level| level.label()).collect();
                info!(identity = %self.identity(), levels = ?labels, "Manifest parsed");
                self.resolution.set_available_resolutions(labels);
                self.restore_saved_level(levels.len())
            }
            PlayerEvent::LevelSwitched { level } => {
                self.on_level_switched(level);
                None
            }
            PlayerEvent::Error(error) => self.on_engine_error(error).map(PlayerCommand::Recover),
        }
    }

    /// Apply a viewer's rendition choice.
    ///
    /// A fixed level is persisted once the engine confirms the switch;
    /// choosing automatic selection is persisted right away.
    pub fn select_level(
        &mut self,
        selection: LevelSelection,
    ) -> Result<PlayerCommand, LoaderError> {
        match selection {
            LevelSelection::Auto => {
                self.resolution.set_resolution(Resolution::Auto);
                self.preferences.save_level(AUTO_LEVEL)?;
            }
            LevelSelection::Level(level) => {
                let state = self.resolution.snapshot();
                let label = state.label_at(level).ok_or(LoaderError::UnknownLevel {
                    level,
                    available: state.available().len(),
                })?;
                self.resolution.set_resolution(label);
            }
        }

        debug!(identity = %self.identity(), %selection, "Level selected");
        self.selection = selection;
        Ok(PlayerCommand::SelectLevel(selection))
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), LoaderError> {
        self.preferences.save_volume(volume)
    }

    pub fn restore_volume(&self) -> f32 {
        self.preferences.restore_volume().unwrap_or(DEFAULT_VOLUME)
    }

    fn restore_saved_level(&mut self, available: usize) -> Option<PlayerCommand> {
        match self.preferences.restore_level(available) {
            Some(level) => {
                let label = self.resolution.snapshot().label_at(level).map(str::to_owned);
                if let Some(label) = label {
                    self.resolution.set_resolution(label);
                }
                info!(identity = %self.identity(), level, "Restored saved level");
                self.selection = LevelSelection::Level(level);
                Some(PlayerCommand::SelectLevel(self.selection))
            }
            None => {
                self.resolution.set_resolution(Resolution::Auto);
                self.selection = LevelSelection::Auto;
                None
            }
        }
    }

    fn on_level_switched(&mut self, level: usize) {
        let label = self.resolution.snapshot().label_at(level).map(str::to_owned);
        debug!(level, label = ?label, "Level switched");
        self.resolution.set_active(label);
        self.current_level = Some(level);

        // Automatic switches are the engine's business, not a preference.
        if self.selection == LevelSelection::Level(level)
            && let Err(err) = self.preferences.save_level(level as i32)
        {
            warn!(error = %err, "Failed to persist selected level");
        }
    }

    fn on_engine_error(&mut self, error: EngineError) -> Option<RecoveryAction> {
        if !error.fatal {
            debug!(kind = ?error.kind, details = %error.details, "Non-fatal engine error");
            return None;
        }

        let action = match error.kind {
            EngineErrorKind::Network => RecoveryAction::StartLoad,
            EngineErrorKind::Media => RecoveryAction::RecoverMediaError,
            EngineErrorKind::Other => {
                self.error = Some(PLAYBACK_ERROR_MESSAGE.to_owned());
                RecoveryAction::Surface(PLAYBACK_ERROR_MESSAGE.to_owned())
            }
        };
        warn!(kind = ?error.kind, details = %error.details, action = ?action, "Fatal engine error");
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LevelInfo;
    use crate::store::MemoryStore;

    fn manifest(heights: &[u64]) -> PlayerEvent {
        PlayerEvent::ManifestParsed {
            levels: heights
                .iter()
                .map(|h| LevelInfo::new(format!("{h}p/index.m3u8"), h * 4000).with_height(*h))
                .collect(),
        }
    }

    fn mount(identity: &str, store: &Arc<MemoryStore>) -> PlayerSession {
        PlayerSession::new(
            VideoIdentity::name(identity),
            ResolutionHandle::new(),
            store.clone(),
        )
    }

    #[test]
    fn first_visit_then_manual_choice_is_restored_on_remount() {
        let store = Arc::new(MemoryStore::new());

        let mut session = mount("intro-101", &store);
        assert_eq!(session.handle_event(manifest(&[360, 720, 1080])), None);
        assert_eq!(session.resolution().available(), ["360p", "720p", "1080p"]);
        assert_eq!(session.resolution().current(), Resolution::Auto);
        assert_eq!(store.get("intro-101_resolution"), None);

        let command = session.select_level(LevelSelection::Level(1)).unwrap();
        assert_eq!(command, PlayerCommand::SelectLevel(LevelSelection::Level(1)));
        assert_eq!(session.resolution().current(), Resolution::fixed("720p"));
        session.handle_event(PlayerEvent::LevelSwitched { level: 1 });
        assert_eq!(store.get("intro-101_resolution").as_deref(), Some("1"));
        assert_eq!(session.resolution().snapshot().active(), Some("720p"));

        let mut remounted = mount("intro-101", &store);
        assert_eq!(
            remounted.handle_event(manifest(&[360, 720, 1080])),
            Some(PlayerCommand::SelectLevel(LevelSelection::Level(1)))
        );
        assert_eq!(remounted.resolution().current(), Resolution::fixed("720p"));
    }

    #[test]
    fn saved_level_needs_enough_renditions() {
        let store = Arc::new(MemoryStore::new());
        store.set("algebra-101_resolution", "2").unwrap();

        let mut session = mount("algebra-101", &store);
        assert_eq!(
            session.handle_event(manifest(&[360, 720, 1080])),
            Some(PlayerCommand::SelectLevel(LevelSelection::Level(2)))
        );

        let mut session = mount("algebra-101", &store);
        assert_eq!(session.handle_event(manifest(&[360, 720])), None);
        assert_eq!(session.selection(), LevelSelection::Auto);
        assert_eq!(session.selection().as_index(), -1);
    }

    #[test]
    fn automatic_switches_are_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut session = mount("intro-101", &store);
        session.handle_event(manifest(&[360, 720, 1080]));

        session.handle_event(PlayerEvent::LevelSwitched { level: 2 });
        assert_eq!(session.current_level(), Some(2));
        assert_eq!(store.get("intro-101_resolution"), None);

        session.select_level(LevelSelection::Level(0)).unwrap();
        session.select_level(LevelSelection::Auto).unwrap();
        assert_eq!(store.get("intro-101_resolution").as_deref(), Some("-1"));
    }

    #[test]
    fn unknown_level_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut session = mount("intro-101", &store);
        session.handle_event(manifest(&[360]));

        let err = session.select_level(LevelSelection::Level(3)).unwrap_err();
        assert!(matches!(err, LoaderError::UnknownLevel { level: 3, available: 1 }));
        assert_eq!(session.selection(), LevelSelection::Auto);
    }

    #[test]
    fn fatal_errors_map_to_recovery_actions() {
        let store = Arc::new(MemoryStore::new());
        let mut session = mount("intro-101", &store);

        let recover = |session: &mut PlayerSession, kind, fatal| {
            let error = if fatal {
                EngineError::fatal(kind, "boom")
            } else {
                EngineError::non_fatal(kind, "boom")
            };
            session.handle_event(PlayerEvent::Error(error))
        };

        assert_eq!(recover(&mut session, EngineErrorKind::Network, false), None);
        assert_eq!(
            recover(&mut session, EngineErrorKind::Network, true),
            Some(PlayerCommand::Recover(RecoveryAction::StartLoad))
        );
        assert_eq!(
            recover(&mut session, EngineErrorKind::Media, true),
            Some(PlayerCommand::Recover(RecoveryAction::RecoverMediaError))
        );
        assert_eq!(session.error(), None);
        assert_eq!(
            recover(&mut session, EngineErrorKind::Other, true),
            Some(PlayerCommand::Recover(RecoveryAction::Surface(
                PLAYBACK_ERROR_MESSAGE.to_owned()
            )))
        );
        assert_eq!(session.error(), Some(PLAYBACK_ERROR_MESSAGE));
    }

    #[test]
    fn volume_defaults_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let session = mount("intro-101", &store);
        assert_eq!(session.restore_volume(), DEFAULT_VOLUME);

        session.set_volume(0.25).unwrap();
        assert_eq!(mount("intro-101", &store).restore_volume(), 0.25);
    }
}
