use std::io::Write;

/// Short sound emitted whenever a message is revealed
pub trait Notifier: Send + Sync {
    fn chime(&self) -> std::io::Result<()>;
}

/// Rings the terminal bell on stderr
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn chime(&self) -> std::io::Result<()> {
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")?;
        err.flush()
    }
}

/// No sound at all
pub struct Silent;

impl Notifier for Silent {
    fn chime(&self) -> std::io::Result<()> {
        Ok(())
    }
}
