use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// A buffered range of media time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Read-only view of the element the engine renders into.
pub trait MediaElement: Send + Sync {
    /// Playhead position in seconds.
    fn current_time(&self) -> f64;

    /// Buffered ranges, ordered by start time.
    fn buffered(&self) -> Vec<TimeRange>;
}

/// Snapshot of the media element taken when a scheduling decision is made.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferWindow {
    pub current_time: f64,
    pub buffered_end: f64,
}

impl BufferWindow {
    /// End of the last buffered range, or 0 when nothing is buffered.
    pub fn from_media(media: &dyn MediaElement) -> Self {
        let buffered_end = media.buffered().last().map(|range| range.end).unwrap_or(0.0);
        Self {
            current_time: media.current_time(),
            buffered_end,
        }
    }

    pub fn buffered_ahead(&self) -> f64 {
        self.buffered_end - self.current_time
    }
}

/// Slot holding the media element once it is mounted.
///
/// Loaders are created before the element exists and keep working (without
/// buffer-aware scheduling) until it is attached.
#[derive(Clone, Default)]
pub struct MediaSlot {
    inner: Arc<RwLock<Option<Arc<dyn MediaElement>>>>,
}

impl fmt::Debug for MediaSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl MediaSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_media(media: Arc<dyn MediaElement>) -> Self {
        let slot = Self::default();
        slot.attach(media);
        slot
    }

    pub fn attach(&self, media: Arc<dyn MediaElement>) {
        *self.inner.write() = Some(media);
    }

    pub fn detach(&self) {
        *self.inner.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn buffer_window(&self) -> Option<BufferWindow> {
        let media = self.inner.read().clone()?;
        Some(BufferWindow::from_media(media.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeMedia;

    #[test]
    fn slot_reports_window_only_while_attached() {
        let slot = MediaSlot::empty();
        assert_eq!(slot.buffer_window(), None);

        let clone = slot.clone();
        clone.attach(Arc::new(FakeMedia::new(3.0, &[(0.0, 12.0)])));
        assert!(slot.is_attached());
        assert_eq!(
            slot.buffer_window(),
            Some(BufferWindow {
                current_time: 3.0,
                buffered_end: 12.0
            })
        );

        slot.detach();
        assert!(!clone.is_attached());
    }

    #[test]
    fn empty_buffer_has_zero_end() {
        let window = BufferWindow::from_media(&FakeMedia::new(4.0, &[]));
        assert_eq!(window.buffered_end, 0.0);
        assert_eq!(window.buffered_ahead(), -4.0);
    }
}
