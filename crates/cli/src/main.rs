use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use exporters::{build_manifest, JobState, LocalRenderQueue, RenderService, RenderSettings};
use project::{ProjectDb, TimelineDoc};
use timeline::{BeatMap, ClipKind, ClipPayload, ClipStore, LayerManager, TimelineController};

#[derive(Parser)]
#[command(name = "beatline-cli")]
#[command(about = "Beatline CLI - headless timeline and beat-map operations")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project database path (defaults to the app data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project
    New {
        /// Project name
        name: String,
    },

    /// List projects in the database
    Projects,

    /// Build a small demo arrangement and save it
    Demo {
        /// Project id (from `new`)
        project: String,

        /// Tempo used for the demo beat grid
        #[arg(long, default_value = "120")]
        bpm: f64,
    },

    /// Print the saved arrangement of a project
    Inspect {
        /// Project id
        project: String,
    },

    /// Generate a beat map from a fixed tempo
    Beats {
        /// Beats per minute
        #[arg(long, default_value = "120")]
        bpm: f64,

        /// Length of the grid in seconds
        #[arg(long, default_value = "60")]
        duration: f64,

        /// First-beat offset in seconds
        #[arg(long, default_value = "0")]
        offset: f64,

        /// Output JSON path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the flattened render manifest of a project
    Manifest {
        /// Project id
        project: String,

        /// Output JSON path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "1920")]
        width: u32,

        #[arg(long, default_value = "1080")]
        height: u32,

        #[arg(long, default_value = "30")]
        fps: f64,
    },

    /// Submit a project to the local render stand-in and wait
    Render {
        /// Project id
        project: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let db_path = cli
        .db
        .unwrap_or_else(|| project::app_data_dir().join("beatline.db"));

    match cli.command {
        Commands::New { name } => new_command(&db_path, &name),
        Commands::Projects => projects_command(&db_path),
        Commands::Demo { project, bpm } => demo_command(&db_path, &project, bpm),
        Commands::Inspect { project } => inspect_command(&db_path, &project),
        Commands::Beats {
            bpm,
            duration,
            offset,
            output,
        } => beats_command(bpm, duration, offset, output),
        Commands::Manifest {
            project,
            output,
            width,
            height,
            fps,
        } => manifest_command(&db_path, &project, output, width, height, fps),
        Commands::Render { project } => render_command(&db_path, &project),
    }
}

fn new_command(db_path: &PathBuf, name: &str) -> Result<()> {
    let db = ProjectDb::open_or_create(db_path)?;
    let id = db.create_project(name)?;
    println!("{id}");
    info!("created project '{name}'");
    Ok(())
}

fn projects_command(db_path: &PathBuf) -> Result<()> {
    let db = ProjectDb::open_or_create(db_path)?;
    for project in db.list_projects()? {
        println!("{}  {}", project.id, project.name);
    }
    Ok(())
}

fn demo_command(db_path: &PathBuf, project_id: &str, bpm: f64) -> Result<()> {
    let db = ProjectDb::open_or_create(db_path)?;
    db.ensure_project(project_id, "demo")?;

    let mut layers = LayerManager::new();
    let mut store = ClipStore::default();

    let beats = BeatMap::from_bpm(bpm, 30.0, 0.0);
    store.set_beat_grid(beats.positions());

    let video = layers
        .available_layer_for(&store, ClipKind::Video)
        .context("no video layer available")?;
    let text = layers
        .available_layer_for(&store, ClipKind::Text)
        .context("no text layer available")?;

    for (index, start) in [0.0, 2.0, 4.0, 6.0].iter().enumerate() {
        store
            .add_clip(
                &layers,
                video,
                ClipKind::Video,
                *start,
                2.0,
                ClipPayload::Media {
                    src: format!("shot-{}.mp4", index + 1),
                    source_offset: 0.0,
                },
            )
            .context("demo clip rejected")?;
    }
    store
        .add_clip(
            &layers,
            text,
            ClipKind::Text,
            0.5,
            1.5,
            ClipPayload::Text {
                text: "Beatline".into(),
                color: "#ffffff".into(),
            },
        )
        .context("demo title rejected")?;

    db.save_timeline(project_id, &TimelineDoc::new(store.export(), layers.export()))?;
    info!(
        "saved demo arrangement: {} clips on {} layers, {} beats at {bpm} bpm",
        store.len(),
        layers.len(),
        beats.len()
    );
    Ok(())
}

fn inspect_command(db_path: &PathBuf, project_id: &str) -> Result<()> {
    let db = ProjectDb::open_or_create(db_path)?;
    let Some(doc) = db.load_timeline(project_id)? else {
        bail!("project '{project_id}' has no saved timeline");
    };

    let mut layers = LayerManager::new();
    layers.import(doc.layers);
    let mut store = ClipStore::default();
    store.import(doc.clips);

    let mut duration: f64 = 0.0;
    for clip in store.clips() {
        duration = duration.max(clip.end());
    }
    let view = TimelineController::new(duration);

    println!("timeline: {}", timeline::format_time(view.duration()));
    for layer in layers.layers() {
        let clips = store.clips_in_layer(layer.id);
        let flags = match (layer.visible, layer.locked) {
            (true, false) => "",
            (true, true) => " [locked]",
            (false, false) => " [hidden]",
            (false, true) => " [hidden, locked]",
        };
        println!("  {} ({}){}: {} clips", layer.name, layer.kind, flags, clips.len());
        for clip in clips {
            println!(
                "    #{} {:?} {} - {}",
                clip.id,
                clip.kind,
                timeline::format_time(clip.start),
                timeline::format_time(clip.end())
            );
        }
    }
    Ok(())
}

fn beats_command(bpm: f64, duration: f64, offset: f64, output: Option<PathBuf>) -> Result<()> {
    let map = BeatMap::from_bpm(bpm, duration, offset);
    info!(
        "generated {} beats at {} bpm",
        map.len(),
        map.meta.bpm.unwrap_or(bpm)
    );
    let json = serde_json::to_string_pretty(&map)?;
    match output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("writing beat map to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn load_arrangement(db: &ProjectDb, project_id: &str) -> Result<(ClipStore, LayerManager)> {
    let Some(doc) = db.load_timeline(project_id)? else {
        bail!("project '{project_id}' has no saved timeline");
    };
    let mut layers = LayerManager::new();
    layers.import(doc.layers);
    let mut store = ClipStore::default();
    store.import(doc.clips);
    Ok((store, layers))
}

fn manifest_command(
    db_path: &PathBuf,
    project_id: &str,
    output: Option<PathBuf>,
    width: u32,
    height: u32,
    fps: f64,
) -> Result<()> {
    let db = ProjectDb::open_or_create(db_path)?;
    let (store, layers) = load_arrangement(&db, project_id)?;
    let settings = RenderSettings {
        width,
        height,
        fps,
        ..RenderSettings::default()
    };
    let manifest = build_manifest(&store, &layers, settings).context("manifest build failed")?;
    let json = manifest.to_json()?;
    match output {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("writing manifest to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn render_command(db_path: &PathBuf, project_id: &str) -> Result<()> {
    let db = ProjectDb::open_or_create(db_path)?;
    let (store, layers) = load_arrangement(&db, project_id)?;
    let manifest =
        build_manifest(&store, &layers, RenderSettings::default()).context("manifest build failed")?;

    let mut queue = LocalRenderQueue::default();
    let job = queue.submit(manifest).context("submit failed")?;
    info!("submitted render job {job}");

    loop {
        queue.poll();
        let status = queue.status(job).context("status failed")?;
        info!("render {:?} {}%", status.state, status.progress);
        match status.state {
            JobState::Done => {
                println!("{}", status.result_url.unwrap_or_default());
                return Ok(());
            }
            JobState::Failed => bail!("render failed: {}", status.error.unwrap_or_default()),
            JobState::Queued | JobState::Processing => {}
        }
    }
}
