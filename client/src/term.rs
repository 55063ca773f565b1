use {
    crossterm::{
        QueueableCommand, cursor,
        style::{Color, ResetColor, SetForegroundColor},
        terminal,
    },
    once_cell::sync::Lazy,
    parking_lot::{Mutex, RawMutex, lock_api::ArcMutexGuard},
    std::{
        fmt::{self, Display, Write as _},
        io::{self, Stdout, Write},
        sync::Arc,
    },
    tracing::{
        Event, Level, Metadata, Subscriber,
        field::{Field, Visit},
    },
    tracing_subscriber::{Layer, layer::Context},
};

/// Stdout with an optional status line kept below the log output.
struct Term {
    stdout: Stdout,
    current_status: Option<String>,
}

fn term() -> ArcMutexGuard<RawMutex, Term> {
    static TERM: Lazy<Arc<Mutex<Term>>> = Lazy::new(|| Arc::new(Mutex::new(Term::new())));
    Mutex::lock_arc(&TERM)
}

#[must_use]
pub struct StatusGuard;

impl StatusGuard {
    pub fn set(&self, status: impl Display) {
        let _ = term().set_status(status);
    }
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        clear_status();
    }
}

/// Shows `status` until the returned guard is dropped.
pub fn set_status(status: impl Display) -> StatusGuard {
    let _ = term().set_status(status);
    StatusGuard
}

pub fn clear_status() {
    let _ = term().clear_status();
}

impl Term {
    fn new() -> Self {
        Self {
            stdout: io::stdout(),
            current_status: None,
        }
    }

    fn set_status(&mut self, status: impl Display) -> io::Result<()> {
        let status = status.to_string();
        if self.current_status.is_none() {
            self.stdout.queue(cursor::Hide)?;
            self.stdout.queue(terminal::DisableLineWrap)?;
        } else {
            self.stdout.queue(cursor::RestorePosition)?;
            self.stdout
                .queue(terminal::Clear(terminal::ClearType::FromCursorDown))?;
        }
        self.stdout.queue(cursor::SavePosition)?;
        self.stdout.queue(SetForegroundColor(Color::DarkGreen))?;
        self.stdout.write_all(status.as_bytes())?;
        self.stdout.queue(ResetColor)?;
        self.stdout.queue(cursor::RestorePosition)?;
        self.stdout.flush()?;
        self.current_status = Some(status);
        Ok(())
    }

    fn clear_status(&mut self) -> io::Result<()> {
        if self.current_status.is_none() {
            return Ok(());
        }

        self.stdout.queue(cursor::RestorePosition)?;
        self.stdout
            .queue(terminal::Clear(terminal::ClearType::FromCursorDown))?;
        self.stdout.queue(terminal::EnableLineWrap)?;
        self.stdout.queue(cursor::Show)?;
        self.stdout.flush()?;

        self.current_status = None;
        Ok(())
    }

    fn write(&mut self, color: Option<Color>, text: impl Display) -> io::Result<()> {
        let old_status = self.current_status.clone();
        self.clear_status()?;
        if let Some(color) = color {
            self.stdout.queue(SetForegroundColor(color))?;
        }
        let mut text = text.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.stdout.write_all(text.as_bytes())?;
        if color.is_some() {
            self.stdout.queue(ResetColor)?;
        }
        if let Some(old_status) = old_status {
            self.set_status(old_status)?;
        }
        self.stdout.flush()
    }
}

/// Prints events of this application's crates to the terminal.
pub struct TermLayer;

impl<S: Subscriber> Layer<S> for TermLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        let mut fields = Vec::new();
        event.record(&mut DebugVisitor(&mut message, &mut fields));
        if !fields.is_empty() {
            let _ = write!(message, " ({})", fields.join(", "));
        }
        let level = *event.metadata().level();
        let color = if level == Level::ERROR || level == Level::WARN {
            Some(Color::Red)
        } else if level == Level::INFO {
            None
        } else {
            Some(Color::Grey)
        };
        let _ = term().write(color, message);
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        metadata
            .module_path()
            .is_some_and(|path| path.starts_with("sealdrop"))
    }
}

struct DebugVisitor<'a>(&'a mut String, &'a mut Vec<String>);

impl Visit for DebugVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        } else {
            self.1.push(format!("{} = {:?}", field.name(), value));
        }
    }
}
