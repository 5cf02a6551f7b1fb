use anyhow::Context;
use crossterm::{
    ExecutableCommand, cursor,
    style::ResetColor,
    terminal::{self, ClearType},
};
use std::io::{Stdout, stdout};

pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        // Build the guard before anything else can fail so Drop restores the tty.
        let guard = Self { _private: () };

        let mut out = stdout();
        out.execute(terminal::EnterAlternateScreen)
            .context("enter alternate screen")?;
        out.execute(terminal::Clear(ClearType::All))
            .context("clear screen")?;
        out.execute(cursor::Hide).context("hide cursor")?;

        Ok(guard)
    }

    pub fn stdout() -> Stdout {
        stdout()
    }

    pub fn size() -> anyhow::Result<(u16, u16)> {
        terminal::size().context("get terminal size")
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut out = stdout();
        let _ = out.execute(ResetColor);
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
    }
}
