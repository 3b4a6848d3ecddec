use std::fmt::Display;
use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};
use refscan::scan::{NullSink, ProgressSink};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// What a line of console output is telling the operator.
#[derive(Clone, Copy, Debug)]
enum Tone {
    Heading,
    Label,
    Note,
    Good,
    Bad,
}

impl Tone {
    fn mark(self) -> &'static str {
        match self {
            Tone::Heading => "==",
            Tone::Label => "",
            Tone::Note => "--",
            Tone::Good => "ok",
            Tone::Bad => "!!",
        }
    }

    fn style(self, theme: Theme) -> Style {
        let light = theme == Theme::Light;
        match (self, light) {
            (_, _) if theme == Theme::Plain => Style::new(),
            (Tone::Heading, false) => Color::Cyan.bold(),
            (Tone::Heading, true) => Color::Blue.bold(),
            (Tone::Label, _) => Style::new().bold(),
            (Tone::Note, false) => Style::new().fg(Color::LightGray),
            (Tone::Note, true) => Style::new().fg(Color::DarkGray),
            (Tone::Good, _) => Color::Green.bold(),
            (Tone::Bad, false) => Color::Yellow.bold(),
            (Tone::Bad, true) => Color::Red.bold(),
        }
    }
}

pub struct Ui {
    theme: Theme,
    paint: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = theme != Theme::Plain && !quiet && std::io::stdout().is_terminal();

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        Self {
            theme,
            paint,
            quiet,
        }
    }

    pub fn spacer(&self) {
        if !self.quiet {
            println!();
        }
    }

    /// Aligned `key: value` block under a heading; nothing when `rows` is empty.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in rows {
            let label = self.tint(Tone::Label, &format!("{key:>width$}:"));
            println!("  {label} {value}");
        }
    }

    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return;
        }
        self.heading(title);
        for entry in entries {
            println!("  - {entry}");
        }
    }

    pub fn info(&self, message: &str) {
        self.say(Tone::Note, message);
    }

    pub fn success(&self, message: &str) {
        self.say(Tone::Good, message);
    }

    /// Warnings go to stderr, even when quiet.
    pub fn warn(&self, message: &str) {
        if self.quiet {
            eprintln!("{message}");
        } else {
            eprintln!("{} {message}", self.tint(Tone::Bad, Tone::Bad.mark()));
        }
    }

    /// Status-line sink for scan and scrub progress.
    pub fn progress(&self) -> Box<dyn ProgressSink> {
        if self.quiet {
            return Box::new(NullSink);
        }
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("|/-\\ ");
        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        Box::new(SpinnerSink { bar })
    }

    fn heading(&self, title: &str) {
        if self.quiet {
            println!("{title}");
        } else {
            println!("{}", self.tint(Tone::Heading, &format!("{} {title}", Tone::Heading.mark())));
        }
    }

    fn say(&self, tone: Tone, message: &str) {
        if self.quiet {
            println!("{message}");
        } else {
            println!("{} {message}", self.tint(tone, tone.mark()));
        }
    }

    fn tint(&self, tone: Tone, text: &str) -> String {
        if self.paint {
            tone.style(self.theme).paint(text).to_string()
        } else {
            text.to_string()
        }
    }
}

struct SpinnerSink {
    bar: ProgressBar,
}

impl ProgressSink for SpinnerSink {
    fn update(&mut self, line: &str) {
        self.bar.set_message(line.to_string());
    }

    // Finished lines stay in the scrollback above the spinner.
    fn finish(&mut self, line: &str) {
        self.bar.println(line);
        self.bar.set_message(String::new());
    }
}

impl Drop for SpinnerSink {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}
