mod ui;

use std::{path::Path, thread};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded};
use gpui::Application;

use sign_dataset_recorder::{
    CollectionReport, CollectorConfig, DatasetCollector, model_download,
    operator::{ChannelCommands, ChannelPreview, spawn_console_reader},
    pipeline::{self, OrtHandExtractor, extractor::OrtHandExtractorConfig},
};

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args_os().nth(1) {
        Some(path) => CollectorConfig::from_path(&path)?,
        None => CollectorConfig::default(),
    };
    log::info!(
        "collecting {} labels into {}",
        config.labels.len(),
        config.base_dir.display()
    );

    let (preview_tx, preview_rx) = bounded(2);
    let (command_tx, command_rx) = unbounded();
    spawn_console_reader(command_tx.clone());

    let _collector = thread::Builder::new()
        .name("collector".into())
        .spawn(move || {
            let preview = ChannelPreview::new(preview_tx);
            let commands = ChannelCommands::new(command_rx);
            if let Err(err) = run_collector(config, preview, commands) {
                log::error!("dataset collection failed: {err:?}");
                eprintln!("Dataset collection failed: {err:#}");
            }
            // Dropping the preview sender closes the window.
        })
        .context("failed to spawn collector thread")?;

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, preview_rx, command_tx) {
                eprintln!("failed to launch ui: {err:?}");
                app.quit();
            }
        });

    Ok(())
}

fn run_collector(
    config: CollectorConfig,
    preview: ChannelPreview,
    commands: ChannelCommands,
) -> Result<()> {
    model_download::ensure_models_ready(&config.models)?;
    let extractor = OrtHandExtractor::new(&config.models, OrtHandExtractorConfig::default())?;

    #[cfg(feature = "camera-nokhwa")]
    match pipeline::describe_cameras() {
        Ok(cameras) => log::info!("available cameras: {}", cameras.join(", ")),
        Err(err) => log::warn!("failed to enumerate cameras: {err:?}"),
    }

    let base_dir = config.base_dir.clone();
    let camera_index = config.camera_index;
    let mut collector = DatasetCollector::new(
        config,
        move || pipeline::open_camera(camera_index),
        extractor,
        preview,
        commands,
    );
    let report = collector.collect()?;
    print_summary(&base_dir, &report);
    Ok(())
}

fn print_summary(base_dir: &Path, report: &CollectionReport) {
    println!("\nData collection finished!");
    for label in &report.labels {
        println!("  {}: {}/{}", label.label, label.saved, label.target);
    }
    println!("Dataset saved in: {}", base_dir.display());
    log::info!("saved {} recordings", report.total_saved());
}
