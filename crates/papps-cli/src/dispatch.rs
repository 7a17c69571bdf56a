use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use papps_core::{normalize_manifest_url, Application, PappsError, Settings};
use papps_installer::current_unix_timestamp;
use papps_registry::HttpUpdateChecker;

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::context::{manifest_loader, CliContext};
use crate::render::{format_application_lines, format_shortcut_lines};
use crate::{Cli, Commands, ConfigCommands, ShortcutCommands};

const SECONDS_PER_HOUR: u64 = 60 * 60;

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Install { url } => {
            let context = CliContext::load(cli.settings.as_deref(), cli.yes)?;
            let mut registry = context.open_registry()?;
            let application = context.load_manifest(&url)?;
            context.renderer.print_section(&format!(
                "Installing {}",
                application.display_name()
            ));
            let installed = registry.add(&application)?;
            context
                .renderer
                .print_status("ok", &install_summary(&installed));
        }
        Commands::Remove { url } => {
            let context = CliContext::load(cli.settings.as_deref(), cli.yes)?;
            let mut registry = context.open_registry()?;
            let url = normalize_manifest_url(&url);
            if !registry.remove(&url)? {
                return Err(PappsError::NotRegistered { url }.into());
            }
            context
                .renderer
                .print_status("ok", &format!("removed {url}"));
        }
        Commands::List => {
            let context = CliContext::load(cli.settings.as_deref(), cli.yes)?;
            let registry = context.open_registry()?;
            if registry.is_empty() {
                println!("No applications installed");
            } else {
                context
                    .renderer
                    .print_lines(&format_application_lines(registry.applications()));
            }
        }
        Commands::Updates {
            apply,
            force,
            endpoint,
        } => {
            let mut context = CliContext::load(cli.settings.as_deref(), cli.yes)?;
            let now = current_unix_timestamp()?;
            if !force && !context.settings.update_check_due(now) {
                context.renderer.print_status(
                    "info",
                    &format!(
                        "skipping update check; the last one ran less than {} hours ago (use --force)",
                        context.settings.update_check_interval().as_secs() / SECONDS_PER_HOUR
                    ),
                );
                return Ok(());
            }

            let endpoint = endpoint
                .or_else(|| context.settings.update_endpoint.clone())
                .ok_or_else(|| {
                    anyhow!(
                        "no update service configured; pass --endpoint or run `papps config set-endpoint`"
                    )
                })?;
            let mut registry = context.open_registry()?;
            let checker = HttpUpdateChecker::new(endpoint)?;
            let updates = registry.updates(&checker, &manifest_loader()?)?;

            context.settings.last_update_check_unix = Some(now);
            context.save_settings()?;

            if updates.is_empty() {
                context
                    .renderer
                    .print_status("ok", "all applications are up to date");
                return Ok(());
            }
            for update in &updates {
                let current = registry.get(&update.url);
                context
                    .renderer
                    .print_status("info", &update_summary(current, update));
            }
            if apply {
                for update in &updates {
                    let installed = registry.add(update)?;
                    context
                        .renderer
                        .print_status("ok", &install_summary(&installed));
                }
            }
        }
        Commands::Repair => {
            let context = CliContext::load(cli.settings.as_deref(), cli.yes)?;
            let mut registry = context.open_registry()?;
            let restored = registry.restore_interrupted()?;
            if restored.is_empty() {
                context
                    .renderer
                    .print_status("ok", "no interrupted installations found");
            }
            for application in &restored {
                context.renderer.print_status(
                    "ok",
                    &format!("restored {}", application.display_name()),
                );
            }
        }
        Commands::Shortcuts { command } => {
            let context = CliContext::load(cli.settings.as_deref(), cli.yes)?;
            let registry = context.open_registry()?;
            match command {
                ShortcutCommands::List => {
                    let shortcuts = registry.services().shortcuts.list()?;
                    if shortcuts.is_empty() {
                        println!("No shortcuts");
                    } else {
                        context
                            .renderer
                            .print_lines(&format_shortcut_lines(&shortcuts));
                    }
                }
                ShortcutCommands::Clear => {
                    registry.services().shortcuts.clear()?;
                    context.renderer.print_status("ok", "removed all shortcuts");
                }
            }
        }
        Commands::Config { command } => {
            let mut context = CliContext::load(cli.settings.as_deref(), cli.yes)?;
            match command {
                ConfigCommands::Show => {
                    let lines = format_settings_lines(
                        &context.settings,
                        &context.settings_path,
                        &context.executable_dir,
                    );
                    context.renderer.print_lines(&lines);
                    return Ok(());
                }
                ConfigCommands::SetBaseDir { path } => {
                    context.settings.base_directory = path;
                }
                ConfigCommands::SetInterval { hours } => {
                    context
                        .settings
                        .set_update_check_interval(interval_from_hours(hours));
                }
                ConfigCommands::SetEndpoint { url } => {
                    context.settings.update_endpoint = Some(url);
                }
            }
            context.save_settings()?;
            context.renderer.print_status(
                "ok",
                &format!("saved settings to {}", context.settings_path.display()),
            );
        }
        Commands::Completions { shell } => {
            let shell_env = std::env::var("SHELL").ok();
            let resolved = resolve_completion_shell(shell, shell_env.as_deref(), cfg!(windows));
            write_completions_script(resolved, &mut io::stdout())?;
        }
        Commands::Version => {
            println!("papps {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

pub(crate) fn interval_from_hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(SECONDS_PER_HOUR))
}

pub(crate) fn install_summary(application: &Application) -> String {
    let location = application
        .install_directory
        .as_ref()
        .map(|directory| format!(" to {}", directory.display()))
        .unwrap_or_default();
    format!(
        "installed {} {}{location}",
        application.display_name(),
        application.version.as_deref().unwrap_or("?")
    )
}

pub(crate) fn update_summary(current: Option<&Application>, update: &Application) -> String {
    let from = current
        .and_then(|application| application.version.as_deref())
        .unwrap_or("?");
    format!(
        "update available: {} {from} -> {}",
        update.display_name(),
        update.version.as_deref().unwrap_or("?")
    )
}

pub(crate) fn format_settings_lines(
    settings: &Settings,
    settings_path: &Path,
    executable_dir: &Path,
) -> Vec<String> {
    let last_check = settings
        .last_update_check_unix
        .map(|seconds| seconds.to_string())
        .unwrap_or_else(|| "never".to_string());
    vec![
        format!("settings: {}", settings_path.display()),
        format!(
            "base-dir: {}",
            settings.resolve_base_directory(executable_dir).display()
        ),
        format!("start-menu-folder: {}", settings.start_menu_directory_name),
        format!(
            "update-interval-hours: {}",
            settings.update_check_interval().as_secs() / SECONDS_PER_HOUR
        ),
        format!(
            "update-endpoint: {}",
            settings.update_endpoint.as_deref().unwrap_or("none")
        ),
        format!("last-update-check: {last_check}"),
    ]
}
