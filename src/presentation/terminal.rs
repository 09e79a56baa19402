use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use crate::audio::format_duration;
use crate::core::{Author, Message, MessageId, MessageKind, Participants};
use crate::presentation::gateway::{
    GatewayError, GatewayResult, IndicatorKind, MessageHandle, PresentationGateway, PreviewSlot,
    RenderRequest,
};
use crate::presentation::waveform::{Waveform, DEFAULT_BAR_COUNT};
use crate::preview::PreviewData;

/// Longest quoted excerpt shown above a reply
const QUOTE_CHARS: usize = 60;
const INDENT: &str = "        ";

/// Prints the simulated conversation as plain text lines
pub struct TerminalGateway {
    out: Mutex<Box<dyn Write + Send>>,
    participants: RwLock<Participants>,
    next_handle: AtomicU64,
    rendered: Mutex<HashMap<MessageHandle, MessageId>>,
    indicator_visible: AtomicBool,
}

impl TerminalGateway {
    pub fn new(out: Box<dyn Write + Send>, participants: Participants) -> Self {
        Self {
            out: Mutex::new(out),
            participants: RwLock::new(participants),
            next_handle: AtomicU64::new(0),
            rendered: Mutex::new(HashMap::new()),
            indicator_visible: AtomicBool::new(false),
        }
    }

    pub fn stdout(participants: Participants) -> Self {
        Self::new(Box::new(std::io::stdout()), participants)
    }

    pub fn set_participants(&self, participants: Participants) {
        *self
            .participants
            .write()
            .unwrap_or_else(PoisonError::into_inner) = participants;
    }

    fn name_of(&self, author: Author) -> String {
        self.participants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(author)
            .name
            .clone()
    }

    fn write_lines(&self, lines: &[String]) -> GatewayResult<()> {
        let mut out = lock(&self.out);
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }

    fn body_lines(&self, message: &Message) -> Vec<String> {
        match message.kind {
            MessageKind::Voice => {
                let wave = Waveform::generate(message.id, DEFAULT_BAR_COUNT).to_glyphs();
                let icon = if message.has_audio() { "▶" } else { "🎤" };
                vec![format!(
                    "{} {} {}",
                    icon,
                    wave,
                    format_duration(message.duration_seconds)
                )]
            }
            MessageKind::Text => {
                let mut lines: Vec<String> = message.text.lines().map(str::to_string).collect();
                if lines.is_empty() {
                    lines.push(String::new());
                }
                lines
            }
        }
    }

    fn quote_line(&self, quoted: &Message) -> String {
        let excerpt = match quoted.kind {
            MessageKind::Voice => {
                format!("🎤 Voice message ({})", format_duration(quoted.duration_seconds))
            }
            MessageKind::Text => {
                let first = quoted.text.lines().next().unwrap_or_default();
                let mut excerpt: String = first.chars().take(QUOTE_CHARS).collect();
                if first.chars().count() > QUOTE_CHARS {
                    excerpt.push('…');
                }
                excerpt
            }
        };
        format!("{}┃ {}: {}", INDENT, self.name_of(quoted.author), excerpt)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-line summary of a resolved preview
pub fn describe_preview(preview: &PreviewData) -> String {
    let mut parts = Vec::new();
    if let Some(title) = &preview.title {
        parts.push(title.clone());
    }
    if let Some(description) = &preview.description {
        parts.push(description.clone());
    }
    let host = preview.host().unwrap_or_else(|| preview.url.clone());
    let icon = if preview.image.is_some() { "🖼" } else { "🔗" };
    if parts.is_empty() {
        format!("{} {}", icon, host)
    } else {
        format!("{} {} ({})", icon, parts.join(" — "), host)
    }
}

impl PresentationGateway for TerminalGateway {
    fn render_message(&self, request: &RenderRequest<'_>) -> GatewayResult<MessageHandle> {
        let message = request.message;
        let handle = MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);

        let mut lines = Vec::new();
        if let Some(quoted) = request.reply_to {
            lines.push(self.quote_line(quoted));
        }

        let prefix = format!("[{}] {}: ", request.timestamp, self.name_of(message.author));
        let pad = " ".repeat(prefix.chars().count());
        for (i, body) in self.body_lines(message).into_iter().enumerate() {
            if i == 0 {
                lines.push(format!("{}{}", prefix, body));
            } else {
                lines.push(format!("{}{}", pad, body));
            }
        }

        if request.preview == PreviewSlot::Loading {
            lines.push(format!("{}⋯ loading link preview", INDENT));
        }

        self.write_lines(&lines)?;
        lock(&self.rendered).insert(handle, message.id);
        Ok(handle)
    }

    fn patch_preview(
        &self,
        handle: MessageHandle,
        preview: Option<&PreviewData>,
        url: &str,
    ) -> GatewayResult<()> {
        let id = lock(&self.rendered)
            .get(&handle)
            .copied()
            .ok_or(GatewayError::UnknownHandle(handle.0))?;

        let line = match preview {
            Some(data) => format!("{}#{} {}", INDENT, id, describe_preview(data)),
            None => format!("{}#{} {}", INDENT, id, url),
        };
        self.write_lines(&[line])
    }

    fn show_indicator(&self, kind: IndicatorKind) -> GatewayResult<()> {
        self.indicator_visible.store(true, Ordering::SeqCst);
        let name = self.name_of(Author::Remote);
        self.write_lines(&[format!("{}{} is {}", INDENT, name, kind.label())])
    }

    fn hide_indicator(&self) -> GatewayResult<()> {
        // Printed lines can't be erased; just track visibility.
        self.indicator_visible.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn clear_all(&self) -> GatewayResult<()> {
        lock(&self.rendered).clear();
        self.indicator_visible.store(false, Ordering::SeqCst);
        self.write_lines(&["── chat cleared ──".to_string()])
    }

    fn auto_play_voice(&self, handle: MessageHandle) -> GatewayResult<()> {
        let id = lock(&self.rendered)
            .get(&handle)
            .copied()
            .ok_or(GatewayError::UnknownHandle(handle.0))?;
        self.write_lines(&[format!("{}♪ playing voice message #{}", INDENT, id)])
    }

    fn playback_changed(&self, running: bool) {
        let line = if running {
            "── playback started ──"
        } else {
            "── playback stopped ──"
        };
        if let Err(e) = self.write_lines(&[line.to_string()]) {
            tracing::debug!("Failed to print playback status: {}", e);
        }
    }

    fn participants_changed(&self, participants: &Participants) {
        self.set_participants(participants.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            lock(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(lock(&self.0).clone()).unwrap()
        }
    }

    fn gateway() -> (TerminalGateway, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let gateway = TerminalGateway::new(Box::new(buffer.clone()), Participants::default());
        (gateway, buffer)
    }

    #[test]
    fn test_render_text_with_reply() {
        let (gateway, buffer) = gateway();
        let quoted = Message::text(1, Author::Remote, "Are you open today?", 1000);
        let mut reply = Message::text(2, Author::Local, "Yes\nuntil five", 1000);
        reply.reply_to_id = Some(1);

        gateway
            .render_message(&RenderRequest {
                message: &reply,
                reply_to: Some(&quoted),
                timestamp: "09:30",
                preview: PreviewSlot::Empty,
            })
            .unwrap();

        let out = buffer.contents();
        assert!(out.contains("┃ Contact: Are you open today?"));
        assert!(out.contains("[09:30] You: Yes"));
        assert!(out.contains("until five"));
    }

    #[test]
    fn test_patch_preview_after_loading() {
        let (gateway, buffer) = gateway();
        let msg = Message::text(4, Author::Local, "see https://example.com/a", 1000);
        let handle = gateway
            .render_message(&RenderRequest {
                message: &msg,
                reply_to: None,
                timestamp: "10:00",
                preview: PreviewSlot::Loading,
            })
            .unwrap();

        let preview = PreviewData::basic("https://example.com/a").unwrap();
        gateway
            .patch_preview(handle, Some(&preview), "https://example.com/a")
            .unwrap();

        let out = buffer.contents();
        assert!(out.contains("loading link preview"));
        assert!(out.contains("#4 🔗 example.com — Web link (example.com)"));
    }

    #[test]
    fn test_patch_unknown_handle_fails() {
        let (gateway, _buffer) = gateway();
        let err = gateway.patch_preview(MessageHandle(42), None, "https://x.y");
        assert!(matches!(err, Err(GatewayError::UnknownHandle(42))));
    }

    #[test]
    fn test_voice_and_indicator() {
        let (gateway, buffer) = gateway();
        let mut voice = Message::voice(3, Author::Remote, 1000);
        voice.duration_seconds = 65;

        gateway.show_indicator(IndicatorKind::Recording).unwrap();
        gateway
            .render_message(&RenderRequest {
                message: &voice,
                reply_to: None,
                timestamp: "11:11",
                preview: PreviewSlot::Empty,
            })
            .unwrap();

        let out = buffer.contents();
        assert!(out.contains("Contact is recording audio…"));
        assert!(out.contains("[11:11] Contact: 🎤 "));
        assert!(out.contains("1:05"));
    }
}
