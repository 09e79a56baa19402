use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::core::{MessageId, Participants};
use crate::presentation::gateway::{
    GatewayError, GatewayResult, IndicatorKind, MessageHandle, PresentationGateway, PreviewSlot,
    RenderRequest,
};
use crate::preview::PreviewData;

/// One call observed by a [`RecordingGateway`]
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Cleared,
    IndicatorShown(IndicatorKind),
    IndicatorHidden,
    Rendered {
        id: MessageId,
        handle: MessageHandle,
        preview: PreviewSlot,
        timestamp: String,
    },
    Patched {
        handle: MessageHandle,
        preview: Option<PreviewData>,
        url: String,
    },
    Scrolled,
    AutoPlayed(MessageHandle),
    PlaybackChanged(bool),
    ParticipantsChanged,
}

/// Gateway that records every call with the (tokio) instant it happened.
///
/// Used to verify playback ordering and timing without a real display.
#[derive(Default)]
pub struct RecordingGateway {
    events: Mutex<Vec<(Instant, GatewayEvent)>>,
    next_handle: AtomicU64,
    failing: Mutex<HashSet<MessageId>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make rendering of `id` fail (for error-path tests)
    pub fn fail_render_of(&self, id: MessageId) {
        lock(&self.failing).insert(id);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
    }

    fn push(&self, event: GatewayEvent) {
        lock(&self.events).push((Instant::now(), event));
    }

    /// All recorded events, oldest first
    pub fn events(&self) -> Vec<(Instant, GatewayEvent)> {
        lock(&self.events).clone()
    }

    /// Events without timestamps
    pub fn kinds(&self) -> Vec<GatewayEvent> {
        lock(&self.events).iter().map(|(_, e)| e.clone()).collect()
    }

    /// Ids of rendered messages in reveal order
    pub fn rendered_ids(&self) -> Vec<MessageId> {
        lock(&self.events)
            .iter()
            .filter_map(|(_, e)| match e {
                GatewayEvent::Rendered { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Instant at which message `id` was (last) rendered
    pub fn rendered_at(&self, id: MessageId) -> Option<Instant> {
        lock(&self.events)
            .iter()
            .rev()
            .find_map(|(at, e)| match e {
                GatewayEvent::Rendered { id: rid, .. } if *rid == id => Some(*at),
                _ => None,
            })
    }

    /// Instants at which an indicator was shown
    pub fn indicator_times(&self) -> Vec<Instant> {
        lock(&self.events)
            .iter()
            .filter_map(|(at, e)| matches!(e, GatewayEvent::IndicatorShown(_)).then_some(*at))
            .collect()
    }

    pub fn patches(&self) -> Vec<(MessageHandle, Option<PreviewData>, String)> {
        lock(&self.events)
            .iter()
            .filter_map(|(_, e)| match e {
                GatewayEvent::Patched {
                    handle,
                    preview,
                    url,
                } => Some((*handle, preview.clone(), url.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn reset_events(&self) {
        lock(&self.events).clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PresentationGateway for RecordingGateway {
    fn render_message(&self, request: &RenderRequest<'_>) -> GatewayResult<MessageHandle> {
        let id = request.message.id;
        if lock(&self.failing).contains(&id) {
            return Err(GatewayError::Render {
                id,
                reason: "injected failure".to_string(),
            });
        }

        let handle = MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.push(GatewayEvent::Rendered {
            id,
            handle,
            preview: request.preview,
            timestamp: request.timestamp.to_string(),
        });
        Ok(handle)
    }

    fn patch_preview(
        &self,
        handle: MessageHandle,
        preview: Option<&PreviewData>,
        url: &str,
    ) -> GatewayResult<()> {
        self.push(GatewayEvent::Patched {
            handle,
            preview: preview.cloned(),
            url: url.to_string(),
        });
        Ok(())
    }

    fn show_indicator(&self, kind: IndicatorKind) -> GatewayResult<()> {
        self.push(GatewayEvent::IndicatorShown(kind));
        Ok(())
    }

    fn hide_indicator(&self) -> GatewayResult<()> {
        self.push(GatewayEvent::IndicatorHidden);
        Ok(())
    }

    fn clear_all(&self) -> GatewayResult<()> {
        self.push(GatewayEvent::Cleared);
        Ok(())
    }

    fn scroll_to_latest(&self) -> GatewayResult<()> {
        self.push(GatewayEvent::Scrolled);
        Ok(())
    }

    fn auto_play_voice(&self, handle: MessageHandle) -> GatewayResult<()> {
        self.push(GatewayEvent::AutoPlayed(handle));
        Ok(())
    }

    fn playback_changed(&self, running: bool) {
        self.push(GatewayEvent::PlaybackChanged(running));
    }

    fn participants_changed(&self, _participants: &Participants) {
        self.push(GatewayEvent::ParticipantsChanged);
    }
}
