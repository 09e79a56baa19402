use crate::core::{Message, MessageKind, Participants};
use crate::preview::PreviewData;
use thiserror::Error;

/// Result type for presentation operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to render message {id}: {reason}")]
    Render { id: u64, reason: String },
    #[error("unknown message handle {0}")]
    UnknownHandle(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Opaque reference to a rendered message, assigned by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub u64);

/// Transient cue shown while the remote party "prepares" a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKind {
    Typing,
    Recording,
}

impl IndicatorKind {
    pub fn for_kind(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Text => IndicatorKind::Typing,
            MessageKind::Voice => IndicatorKind::Recording,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IndicatorKind::Typing => "typing…",
            IndicatorKind::Recording => "recording audio…",
        }
    }
}

/// What occupies the link-preview slot when a message is first rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewSlot {
    Empty,
    Loading,
}

/// Everything the gateway needs to draw one message
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub message: &'a Message,
    /// Message being replied to, if it still exists
    pub reply_to: Option<&'a Message>,
    /// Wall-clock time captured at reveal
    pub timestamp: &'a str,
    pub preview: PreviewSlot,
}

/// Capability surface the timeline engine drives.
///
/// Implementations:
/// - [`TerminalGateway`](super::TerminalGateway) prints the conversation
/// - [`RecordingGateway`](super::RecordingGateway) records calls for tests
pub trait PresentationGateway: Send + Sync {
    /// Draw a message and append it to the conversation
    fn render_message(&self, request: &RenderRequest<'_>) -> GatewayResult<MessageHandle>;

    /// Replace the loading placeholder of a rendered message.
    ///
    /// `preview` is `None` when no preview could be built at all.
    fn patch_preview(
        &self,
        handle: MessageHandle,
        preview: Option<&PreviewData>,
        url: &str,
    ) -> GatewayResult<()>;

    fn show_indicator(&self, kind: IndicatorKind) -> GatewayResult<()>;

    fn hide_indicator(&self) -> GatewayResult<()>;

    /// Remove every rendered message
    fn clear_all(&self) -> GatewayResult<()>;

    fn scroll_to_latest(&self) -> GatewayResult<()> {
        Ok(())
    }

    /// Start playing a rendered voice message
    fn auto_play_voice(&self, _handle: MessageHandle) -> GatewayResult<()> {
        Ok(())
    }

    /// Run started or stopped (e.g. to toggle start/stop controls)
    fn playback_changed(&self, _running: bool) {}

    /// Participant names or avatars were replaced (script import)
    fn participants_changed(&self, _participants: &Participants) {}
}
