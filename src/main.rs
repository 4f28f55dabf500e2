#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use bulwark::BulwarkApp;
use bulwark::config::load_setup;
use std::path::PathBuf;

/// `bulwark [config.json] [catalog.json]`
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1).map(PathBuf::from);
    let config_path = args.next();
    let catalog_path = args.next();
    let (catalog, config) = load_setup(config_path.as_deref(), catalog_path.as_deref())?;

    // Networking tasks are spawned from the UI thread.
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Bulwark")
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 400.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Bulwark",
        native_options,
        Box::new(|cc| Ok(Box::new(BulwarkApp::new(cc, catalog, config)))),
    )?;
    Ok(())
}
