mod cli;

use aether::config::{self, AppConfig};
use aether::engine::{self, LocalEngine};
use aether::queue::{QueueEvent, QueueItem};
use aether::settings::{clean_overrides, has_effective_override, FieldOverride, SettingsOverride};
use aether::storage::JsonFileStore;
use aether::AppContext;
use aether_common::{AudioFormat, ImageFormat, MediaType, ProcessStatus, VideoFormat};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, OverrideAction, OverrideFields, SessionAction, SettingsAction};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "aether=trace,aether_common=trace".to_string()
        } else {
            "aether=info,aether_common=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Version => {
            println!("aether {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_command(command, cli.config.as_deref()))
        }
    }
}

fn open_context(config: AppConfig) -> Result<AppContext> {
    let storage = JsonFileStore::open(&config.storage.data_dir)
        .with_context(|| format!("Failed to open data directory {:?}", config.storage.data_dir))?;
    let engine = Arc::new(LocalEngine::new(&config.tools));
    Ok(AppContext::new(config, Arc::new(storage), engine))
}

async fn run_command(command: Commands, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let ctx = open_context(config)?;

    let session = ctx.session.load().await;
    if session.awaiting_decision && !matches!(command, Commands::Session { .. }) {
        eprintln!(
            "Previous session with {} items found; keeping it (use `aether session discard` to drop it)",
            session.loaded
        );
        ctx.session.restore().await;
    }

    let result = match command {
        Commands::Add { paths, thumbnails } => add(&ctx, paths, thumbnails).await,
        Commands::Run { no_retry_errors } => {
            run_queue(&ctx, Drain::All { retry_errors: !no_retry_errors }).await
        }
        Commands::RunSelected { ids } => run_queue(&ctx, Drain::Selected(ids)).await,
        Commands::Status { json } => status(&ctx, json),
        Commands::Resume { retry_errors } => {
            let count = ctx.store.resume_queue(retry_errors);
            println!("{} items reset to pending", count);
            Ok(())
        }
        Commands::RetryCompleted => {
            let count = ctx.store.retry_completed();
            println!("{} items reset to pending", count);
            Ok(())
        }
        Commands::Remove { ids } => {
            let removed = ctx.store.remove_items(&ids);
            ctx.thumbnails.forget(&removed).await;
            println!("Removed {} items", removed.len());
            Ok(())
        }
        Commands::Clear => {
            let removed = ctx.store.clear_queue();
            ctx.thumbnails.forget(&removed).await;
            println!("Removed {} items", removed.len());
            Ok(())
        }
        Commands::Session { action } => session_action(&ctx, action, session.awaiting_decision).await,
        Commands::Settings { action } => settings_action(&ctx, action),
        Commands::Override { action } => override_action(&ctx, action),
        Commands::CheckTools | Commands::Version => Ok(()),
    };

    print_notices(&ctx);
    result
}

fn print_notices(ctx: &AppContext) {
    for notice in ctx.notifier.recent(usize::MAX) {
        println!("[{}] {}", notice.level, notice.message);
    }
}

async fn add(ctx: &AppContext, paths: Vec<std::path::PathBuf>, thumbnails: bool) -> Result<()> {
    let report = ctx.ingestor.ingest(paths).await?;
    for item in &report.new_items {
        println!("+ {}  {}", item.id, item.file_name);
    }
    if thumbnails && report.added > 0 {
        let thumbs = ctx.thumbnails.generate_pending().await;
        println!("Thumbnails: {} generated, {} failed", thumbs.loaded, thumbs.failed);
    }
    Ok(())
}

enum Drain {
    All { retry_errors: bool },
    Selected(Vec<aether_common::ItemId>),
}

async fn run_queue(ctx: &AppContext, drain: Drain) -> Result<()> {
    let cancel = CancellationToken::new();
    let applier = ctx.spawn_event_applier(cancel.clone());
    let printer = spawn_status_printer(ctx, cancel.clone());

    let scheduler = Arc::clone(&ctx.scheduler);
    let mut task = tokio::spawn(async move {
        match drain {
            Drain::All { retry_errors } => scheduler.start_processing(retry_errors).await,
            Drain::Selected(ids) => scheduler.process_selected(ids).await,
        }
    });

    let finished = tokio::select! {
        result = &mut task => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let summary = match finished {
        Some(result) => result??,
        None => {
            eprintln!("Stopping after the current item...");
            ctx.scheduler.stop().await;
            task.await??
        }
    };

    cancel.cancel();
    let _ = applier.await;
    let _ = printer.await;

    println!(
        "Done: {} processed, {} succeeded, {} failed, {} cancelled",
        summary.processed, summary.succeeded, summary.failed, summary.cancelled
    );
    Ok(())
}

fn spawn_status_printer(ctx: &AppContext, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let store = Arc::clone(&ctx.store);
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(QueueEvent::StatusChanged { id, status, message }) => {
                        let name = store.get(id).map(|i| i.file_name).unwrap_or_default();
                        let mark = match status {
                            ProcessStatus::Completed => "✓",
                            ProcessStatus::Error | ProcessStatus::Conflict => "✗",
                            ProcessStatus::Cancelled => "-",
                            _ => " ",
                        };
                        match message {
                            Some(m) => println!("{} {:<10} {}  ({})", mark, status, name, m),
                            None => println!("{} {:<10} {}", mark, status, name),
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
    })
}

fn status(ctx: &AppContext, json: bool) -> Result<()> {
    let items = ctx.store.items();
    let stats = ctx.store.stats();

    if json {
        let value = serde_json::json!({ "stats": stats, "items": items });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let global = ctx.settings.global();
    for item in &items {
        print_item(item, has_effective_override(item.override_settings.as_ref(), &global));
    }
    println!();
    println!(
        "{} items: {} pending, {} completed, {} failed, {} cancelled",
        stats.total,
        stats.pending,
        stats.completed,
        stats.failed(),
        stats.cancelled
    );
    Ok(())
}

fn print_item(item: &QueueItem, overridden: bool) {
    print!(
        "{}  {:<10} {:>3}%  {}",
        item.id, item.status, item.progress, item.file_name
    );
    if overridden {
        print!(" [custom]");
    }
    if let Some(ref message) = item.error_message {
        print!("  ({})", message);
    }
    if let Some(ref output) = item.output_path {
        print!(" -> {}", output.display());
    }
    println!();
}

async fn session_action(ctx: &AppContext, action: SessionAction, awaiting: bool) -> Result<()> {
    if !awaiting {
        println!("No previous session awaiting a decision");
        return Ok(());
    }
    match action {
        SessionAction::Restore => {
            ctx.session.restore().await;
        }
        SessionAction::Discard => {
            ctx.session.discard().await;
        }
    }
    Ok(())
}

fn settings_action(ctx: &AppContext, action: SettingsAction) -> Result<()> {
    let settings = &ctx.settings;
    match action {
        SettingsAction::Show => {
            let value = serde_json::json!({
                "settings": settings.global(),
                "preferences": settings.preferences(),
                "items_with_overrides": ctx.store.override_count(&settings.global()),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        SettingsAction::SetQuality { quality } => settings.update_with(|s| s.quality_percent = quality),
        SettingsAction::SetFormat { category, format } => {
            let patch = format_override(category, &format)?;
            settings.update(&patch);
        }
        SettingsAction::SetOutputDir { dir } => settings.set_output_directory(dir),
        SettingsAction::SetConflict { mode } => settings.set_conflict_mode(mode),
        SettingsAction::SetAutoRestore { enabled } => settings.set_auto_restore(enabled),
        SettingsAction::Reset => settings.reset(),
    }
    Ok(())
}

/// Patch setting the output format of one category; `"original"` keeps the
/// input container.
fn format_override(category: MediaType, format: &str) -> Result<SettingsOverride> {
    let keep = format.eq_ignore_ascii_case("original");
    let mut patch = SettingsOverride::default();
    match category {
        MediaType::Video => {
            let value = if keep {
                None
            } else {
                Some(format.parse::<VideoFormat>().map_err(anyhow::Error::msg)?)
            };
            patch.video_format = FieldOverride::Set(value);
        }
        MediaType::Image => {
            let value = if keep {
                None
            } else {
                Some(format.parse::<ImageFormat>().map_err(anyhow::Error::msg)?)
            };
            patch.image_format = FieldOverride::Set(value);
        }
        MediaType::Audio => {
            let value = if keep {
                None
            } else {
                Some(format.parse::<AudioFormat>().map_err(anyhow::Error::msg)?)
            };
            patch.audio_format = FieldOverride::Set(value);
        }
    }
    Ok(patch)
}

fn override_action(ctx: &AppContext, action: OverrideAction) -> Result<()> {
    match action {
        OverrideAction::Set { id, fields } => {
            let item = ctx
                .store
                .get(id)
                .ok_or_else(|| aether_common::Error::not_found("item", id))?;
            let patch = override_patch(item.media_type, fields)?;
            ctx.store.merge_override(id, &patch);

            let global = ctx.settings.global();
            let merged = ctx.store.get(id).and_then(|i| i.override_settings);
            ctx.store.replace_override(id, clean_overrides(merged.as_ref(), &global));
            if !has_effective_override(ctx.store.get(id).and_then(|i| i.override_settings).as_ref(), &global) {
                println!("Item {} matches the global settings", id);
            }
        }
        OverrideAction::Clear { id: _, all: true } => ctx.store.clear_all_overrides(),
        OverrideAction::Clear { id: Some(id), all: false } => ctx.store.clear_override(id),
        OverrideAction::Clear { id: None, all: false } => anyhow::bail!("An item id or --all is required"),
    }
    Ok(())
}

fn override_patch(media_type: MediaType, fields: OverrideFields) -> Result<SettingsOverride> {
    let mut patch = match fields.format {
        Some(ref format) => format_override(media_type, format)?,
        None => SettingsOverride::default(),
    };
    if let Some(quality) = fields.quality {
        patch.quality_percent = FieldOverride::Set(quality);
    }
    if let Some(muted) = fields.muted {
        patch.is_muted = FieldOverride::Set(muted);
    }
    if let Some(strip) = fields.strip_metadata {
        patch.strip_metadata = FieldOverride::Set(strip);
    }
    if let Some(dir) = fields.output_dir {
        patch.output_directory = FieldOverride::Set(Some(dir));
    }
    Ok(patch)
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = engine::check_tools(&config.tools);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Only copy/rename conversions will work.");
    }

    Ok(())
}
