use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use anyhow::{Context, Result};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use papps_core::{release_date, Application, Shortcut};
use papps_installer::UserPrompt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    total: Option<u64>,
    current: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!();
            println!("{}", colorize(section_style(), &line));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_download(self, label: &str, total: Option<u64>) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let (progress_bar, template) = match total {
                Some(total) => (
                    ProgressBar::new(total),
                    "{spinner:.cyan.bold} {msg} [{bar:20.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec}",
                ),
                None => (
                    ProgressBar::no_length(),
                    "{spinner:.cyan.bold} {msg} {bytes} {bytes_per_sec}",
                ),
            };
            if let Ok(style) = ProgressStyle::with_template(template) {
                progress_bar.set_style(style.tick_chars(".oO@* ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            total,
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalProgress {
    pub(crate) fn set(&mut self, current: u64, total: Option<u64>) {
        self.current = current;
        if total.is_some() {
            self.total = total;
        }

        let Some(progress_bar) = &self.progress_bar else {
            return;
        };
        if let Some(total) = self.total {
            progress_bar.set_length(total.max(current));
        }
        progress_bar.set_position(current);
    }

    pub(crate) fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            self.current,
            self.total,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

/// Presents installer messages and license agreements on the terminal.
pub(crate) struct TerminalPrompt {
    renderer: TerminalRenderer,
    assume_yes: bool,
    download: Mutex<Option<TerminalProgress>>,
}

impl TerminalPrompt {
    pub(crate) fn new(renderer: TerminalRenderer, assume_yes: bool) -> Self {
        Self {
            renderer,
            assume_yes,
            download: Mutex::new(None),
        }
    }

    fn replace_download(&self, next: Option<TerminalProgress>) -> Option<TerminalProgress> {
        match self.download.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, next),
            Err(_) => None,
        }
    }
}

impl UserPrompt for TerminalPrompt {
    fn display(&self, message: &str) -> Result<()> {
        self.renderer.print_status("info", message);
        Ok(())
    }

    fn accept_eula(&self, text: &str) -> Result<bool> {
        self.renderer.print_section("License agreement");
        println!("{text}");
        if self.assume_yes {
            self.renderer
                .print_status("ok", "license agreement accepted (--yes)");
            return Ok(true);
        }
        if !io::stdin().is_terminal() {
            self.renderer.print_status(
                "warn",
                "no terminal to confirm the license agreement; pass --yes to accept it",
            );
            return Ok(false);
        }

        print!("Do you accept the license agreement? [y/N] ");
        io::stdout()
            .flush()
            .context("failed to flush confirmation prompt")?;
        let mut answer = String::new();
        io::stdin()
            .read_line(&mut answer)
            .context("failed to read confirmation answer")?;
        Ok(parse_confirmation(&answer))
    }

    fn download_started(&self, url: &str) {
        let label = download_label(url);
        if let Some(previous) = self.replace_download(Some(self.renderer.start_download(&label, None))) {
            previous.finish_abandon();
        }
    }

    fn download_progress(&self, downloaded: u64, total: Option<u64>) {
        if let Ok(mut slot) = self.download.lock() {
            if let Some(progress) = slot.as_mut() {
                progress.set(downloaded, total);
            }
        }
    }

    fn download_finished(&self, _url: &str) {
        if let Some(progress) = self.replace_download(None) {
            progress.finish_success();
        }
    }
}

impl Drop for TerminalPrompt {
    fn drop(&mut self) {
        if let Some(progress) = self.replace_download(None) {
            progress.finish_abandon();
        }
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    output_style_for(
        io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn output_style_for(is_terminal: bool, no_color: bool) -> OutputStyle {
    if is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

pub(crate) fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn download_label(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(url)
        .to_string()
}

pub(crate) fn format_application_lines(applications: &[Application]) -> Vec<String> {
    let mut sorted = applications.iter().collect::<Vec<_>>();
    sorted.sort_by_key(|application| application.display_name().to_ascii_lowercase());
    sorted
        .into_iter()
        .map(|application| {
            let released = application
                .release_date
                .as_ref()
                .map(|date| format!(" released={}", release_date::format(date)))
                .unwrap_or_default();
            let directory = application
                .install_directory
                .as_ref()
                .map(|directory| format!(" path={}", directory.display()))
                .unwrap_or_default();
            format!(
                "{} {}{released}{directory} url={}",
                application.display_name(),
                application.version.as_deref().unwrap_or("?"),
                application.url
            )
        })
        .collect()
}

pub(crate) fn format_shortcut_lines(shortcuts: &[Shortcut]) -> Vec<String> {
    shortcuts
        .iter()
        .map(|shortcut| format!("{} -> {}", shortcut.file_name, shortcut.target))
        .collect()
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(format!("== {title} ==")),
    }
}

fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: Option<u64>,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.unwrap_or(current).max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current as usize) * width) / (safe_total as usize);
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        HumanBytes(current),
        suffix
    ))
}
