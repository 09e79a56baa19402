pub mod gateway;
pub mod notifier;
pub mod recording;
pub mod terminal;
pub mod waveform;

pub use gateway::{
    GatewayError, GatewayResult, IndicatorKind, MessageHandle, PresentationGateway, PreviewSlot,
    RenderRequest,
};
pub use notifier::{Notifier, Silent, TerminalBell};
pub use recording::{GatewayEvent, RecordingGateway};
pub use terminal::TerminalGateway;
pub use waveform::Waveform;
