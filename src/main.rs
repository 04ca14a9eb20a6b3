mod api;
mod app;
mod geometry;
mod labels;
mod session;
mod sync;

use std::sync::Arc;

use clap::Parser;
use eframe::egui;

use api::{HttpApi, NoToken, ProjectApi, StaticToken, TokenProvider};
use app::AnnotateApp;

/// Draw labeled bounding boxes on a project image stored on a remote
/// annotation server.
#[derive(Parser)]
#[command(name = "annotate-client", version)]
struct Args {
    /// Base URL of the annotation server, e.g. http://localhost:1337
    #[arg(long)]
    server: String,
    /// UUID of the project owning the labels
    #[arg(long)]
    project: String,
    /// UUID of the image to annotate
    #[arg(long)]
    image: String,
    /// Bearer token; falls back to the ANNOTATE_TOKEN environment variable
    #[arg(long)]
    token: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let tokens: Arc<dyn TokenProvider> = match args
        .token
        .or_else(|| std::env::var("ANNOTATE_TOKEN").ok())
    {
        Some(token) => Arc::new(StaticToken(token)),
        None => {
            log::warn!("no bearer token configured; remote operations will fail until one is set");
            Arc::new(NoToken)
        }
    };
    let api: Arc<dyn ProjectApi> = Arc::new(HttpApi::new(&args.server, tokens));

    let title = format!("annotate-client — {}", args.image);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title(&title),
        ..Default::default()
    };

    eframe::run_native(
        &title,
        options,
        Box::new(move |_cc| Ok(Box::new(AnnotateApp::new(api, args.project, args.image)))),
    )
    .expect("Failed to run eframe");
}
