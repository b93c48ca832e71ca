use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use imagine_contracts::garments::GarmentKind;
use imagine_contracts::images::GeneratedImage;
use imagine_contracts::options::{
    AspectRatio, BackgroundMode, LogoStyle, MaterialTag, StyleTag, ViewAngle,
};
use imagine_contracts::panels::{clamp_count, clamp_influence};
use imagine_engine::config::DEFAULT_DATA_DIR;
use imagine_engine::data_uri::{read_file_as_data_uri, write_data_uri_to_file};
use imagine_engine::{
    AnalystPanel, ApiError, CreatorPanel, CredentialStatus, EditorPanel, Gateway, GatewayConfig,
    MaskStroke, PanelTarget, PromptSelection, SwapperPanel, Workspace,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(
    name = "imagine-rs",
    version,
    about = "Generate, analyze, edit and garment-swap images"
)]
struct Cli {
    /// Directory holding the image history, panel state and event log.
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data: PathBuf,
    #[arg(long, global = true)]
    image_model: Option<String>,
    #[arg(long, global = true)]
    text_model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the configured key and optionally ping the backend.
    Diagnose(DiagnoseArgs),
    Generate(GenerateArgs),
    Analyze(AnalyzeArgs),
    Edit(EditArgs),
    Swap(SwapArgs),
    #[command(subcommand)]
    History(HistoryCommand),
    /// Reset a panel's saved form.
    Clear(ClearArgs),
}

#[derive(Debug, Parser)]
struct DiagnoseArgs {
    #[arg(long)]
    ping: bool,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// Falls back to the saved (or transferred) prompt when omitted.
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    negative: Option<String>,
    #[arg(long)]
    aspect: Option<AspectRatio>,
    /// Images per request, 1 to 4.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=4))]
    count: Option<u32>,
    #[arg(long)]
    view: Option<ViewAngle>,
    #[arg(long = "style")]
    styles: Vec<StyleTag>,
    #[arg(long = "logo-style")]
    logo_styles: Vec<LogoStyle>,
    #[arg(long = "material")]
    materials: Vec<MaterialTag>,
    /// Describe the background instead of a neutral studio one.
    #[arg(long, conflicts_with = "neutral_background")]
    background: Option<String>,
    #[arg(long)]
    neutral_background: bool,
    #[arg(long)]
    reference: Option<PathBuf>,
    #[arg(long)]
    pose: Option<PathBuf>,
    #[arg(long)]
    style_influence: Option<f32>,
    #[arg(long)]
    pose_influence: Option<f32>,
    /// Also write every new image into this directory.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Falls back to the saved (or transferred) image when omitted.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Hand the result to the creator: positive, negative or both.
    #[arg(long)]
    send: Option<PromptSelection>,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    negative: Option<String>,
    #[arg(long)]
    view: Option<ViewAngle>,
    #[arg(long = "style")]
    styles: Vec<StyleTag>,
    #[arg(long = "material")]
    materials: Vec<MaterialTag>,
    #[arg(long)]
    aspect: Option<AspectRatio>,
    /// JSON list of strokes: [{"mode": "paint", "radius": 12, "points": [[x, y], ...]}].
    #[arg(long, conflicts_with = "mask")]
    strokes: Option<PathBuf>,
    /// Ready-made mask image; painted pixels mark the area to edit.
    #[arg(long)]
    mask: Option<PathBuf>,
    /// Size the stroke coordinates were recorded at, e.g. 512x384.
    #[arg(long)]
    display: Option<String>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct SwapArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    /// Garment to activate, optionally with a description: `top=white linen shirt`.
    #[arg(long = "garment")]
    garments: Vec<String>,
    /// Reference photo for a garment: `shoes=path/to/shoes.jpg`.
    #[arg(long = "garment-ref")]
    garment_refs: Vec<String>,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Subcommand)]
enum HistoryCommand {
    List,
    Delete { id: String },
    Export { id: String, out: PathBuf },
    /// Queue a history image for the analyst, editor or swapper.
    Send { id: String, target: PanelTarget },
    /// Seed the creator form from a history image.
    Variation { id: String },
}

#[derive(Debug, Parser)]
struct ClearArgs {
    panel: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("imagine-rs error: {err:#}");
            if let Some(api) = ApiError::find(&err) {
                if api.is_retryable() {
                    eprintln!("This failure is temporary; run the command again in a moment.");
                } else {
                    eprintln!("Retrying will not help until the cause above is fixed.");
                }
            }
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config =
        GatewayConfig::from_env().with_models(cli.image_model.clone(), cli.text_model.clone());
    let workspace = Workspace::open(&cli.data)?;
    warn_on_malformed_credential(&workspace, &config);

    let code = match cli.command {
        Command::Diagnose(args) => run_diagnose(&workspace, &config, args)?,
        Command::Generate(args) => run_generate(&workspace, &config, args)?,
        Command::Analyze(args) => run_analyze(&workspace, &config, args)?,
        Command::Edit(args) => run_edit(&workspace, &config, args)?,
        Command::Swap(args) => run_swap(&workspace, &config, args)?,
        Command::History(command) => run_history(&workspace, command)?,
        Command::Clear(args) => run_clear(&workspace, args)?,
    };
    workspace.close()?;
    Ok(code)
}

fn warn_on_malformed_credential(workspace: &Workspace, config: &GatewayConfig) {
    if let CredentialStatus::Malformed { reason } = config.credential_status() {
        eprintln!("warning: {reason}");
        workspace.emit("credential_warning", json!({ "reason": reason }));
    }
}

fn gateway(workspace: &Workspace, config: &GatewayConfig) -> Result<Gateway> {
    let gateway = Gateway::from_config(config)?.with_events(workspace.events().clone());
    for note in gateway.notes() {
        eprintln!("note: {note}");
    }
    Ok(gateway)
}

fn run_diagnose(workspace: &Workspace, config: &GatewayConfig, args: DiagnoseArgs) -> Result<i32> {
    let status = config.credential_status();
    println!("credential: {}", status.message());
    println!("api base: {}", config.api_base);
    println!("data: {}", workspace.root().display());
    if !args.ping {
        return Ok(if status.is_usable() { 0 } else { 1 });
    }

    let gateway = gateway(workspace, config)?;
    println!("image model: {}", gateway.image_model());
    println!("text model: {}", gateway.vision_model());
    match gateway.test_connection() {
        Ok(reply) => {
            println!("connection: SUCCESS ({reply})");
            Ok(0)
        }
        Err(err) => {
            println!("connection: FAILED ({err})");
            Ok(1)
        }
    }
}

fn run_generate(workspace: &Workspace, config: &GatewayConfig, args: GenerateArgs) -> Result<i32> {
    let reference = args.reference.as_deref().map(read_image).transpose()?;
    let pose = args.pose.as_deref().map(read_image).transpose()?;
    let mut panel = CreatorPanel::mount(workspace.clone(), gateway(workspace, config)?)?;
    panel.update(|state| {
        if let Some(prompt) = args.prompt {
            state.prompt = prompt;
        }
        if let Some(negative) = args.negative {
            state.neg_prompt = negative;
        }
        if let Some(aspect) = args.aspect {
            state.aspect_ratio = aspect;
        }
        if let Some(count) = args.count {
            state.count = clamp_count(count);
        }
        if let Some(view) = args.view {
            state.view = view;
        }
        if !args.styles.is_empty() {
            state.styles = args.styles;
        }
        if !args.logo_styles.is_empty() {
            state.logo_styles = args.logo_styles;
        }
        if !args.materials.is_empty() {
            state.materials = args.materials;
        }
        if let Some(text) = args.background {
            state.background = BackgroundMode::Descriptive(text);
        } else if args.neutral_background {
            state.background = BackgroundMode::Neutral;
        }
        if reference.is_some() {
            state.ref_image = reference;
        }
        if pose.is_some() {
            state.pose_image = pose;
        }
        if let Some(weight) = args.style_influence {
            state.style_influence = clamp_influence(weight);
        }
        if let Some(weight) = args.pose_influence {
            state.pose_influence = clamp_influence(weight);
        }
    })?;

    let images = panel.generate()?;
    for image in &images {
        println!("{}", describe_image(image));
        if let Some(dir) = args.out.as_deref() {
            let path = dir.join(format!("{}.png", image.id));
            write_data_uri_to_file(&image.url, &path)?;
            println!("  saved {}", path.display());
        }
    }
    Ok(0)
}

fn run_analyze(workspace: &Workspace, config: &GatewayConfig, args: AnalyzeArgs) -> Result<i32> {
    let mut panel = AnalystPanel::mount(workspace.clone(), gateway(workspace, config)?)?;
    if let Some(path) = args.image.as_deref() {
        panel.set_image(read_image(path)?)?;
    }
    let result = panel.analyze()?;
    println!("positive: {}", result.positive);
    println!("negative: {}", result.negative);
    if let Some(selection) = args.send {
        panel.transfer_to_creator(selection)?;
        println!("sent to creator; run `imagine-rs generate` to use it");
    }
    Ok(0)
}

fn run_edit(workspace: &Workspace, config: &GatewayConfig, args: EditArgs) -> Result<i32> {
    let mut panel = EditorPanel::mount(workspace.clone(), gateway(workspace, config)?)?;
    if let Some(path) = args.image.as_deref() {
        panel.load_image(read_image(path)?)?;
    }
    panel.update(|state| {
        if let Some(prompt) = args.prompt {
            state.prompt = prompt;
        }
        if let Some(negative) = args.negative {
            state.neg_prompt = negative;
        }
        if let Some(view) = args.view {
            state.view = view;
        }
        if !args.styles.is_empty() {
            state.styles = args.styles;
        }
        if !args.materials.is_empty() {
            state.materials = args.materials;
        }
        if let Some(aspect) = args.aspect {
            state.aspect_ratio = aspect;
        }
    })?;

    let result = if let Some(path) = args.mask.as_deref() {
        let mask = read_image(path)?;
        panel.edit_with_mask(Some(&mask))?
    } else {
        if let Some(display) = args.display.as_deref() {
            let (width, height) = parse_size(display)?;
            panel.set_display_size(width, height);
        }
        if let Some(path) = args.strokes.as_deref() {
            panel.apply_strokes(&read_strokes(path)?);
        }
        panel.edit()?
    };
    write_data_uri_to_file(&result, &args.out)?;
    println!("edited image written to {}", args.out.display());
    Ok(0)
}

fn run_swap(workspace: &Workspace, config: &GatewayConfig, args: SwapArgs) -> Result<i32> {
    let mut panel = SwapperPanel::mount(workspace.clone(), gateway(workspace, config)?)?;
    if let Some(path) = args.image.as_deref() {
        panel.set_main_image(read_image(path)?)?;
    }
    for spec in &args.garments {
        let (kind, description) = parse_garment_spec(spec)?;
        panel.set_active(kind.key(), true)?;
        if let Some(description) = description {
            panel.set_description(kind.key(), &description)?;
        }
    }
    for spec in &args.garment_refs {
        let (kind, path) = parse_garment_spec(spec)?;
        let Some(path) = path else {
            bail!("--garment-ref needs kind=path, got '{spec}'");
        };
        panel.set_reference(kind.key(), Some(read_image(Path::new(&path))?))?;
    }

    let result = panel.swap()?;
    write_data_uri_to_file(&result, &args.out)?;
    println!("swapped image written to {}", args.out.display());
    Ok(0)
}

fn run_history(workspace: &Workspace, command: HistoryCommand) -> Result<i32> {
    // History management never reaches the backend.
    let mut panel = CreatorPanel::mount(workspace.clone(), Gateway::offline())?;
    match command {
        HistoryCommand::List => {
            let images = panel.history()?;
            if images.is_empty() {
                println!("history is empty");
            }
            for image in &images {
                println!("{}", describe_image(image));
            }
        }
        HistoryCommand::Delete { id } => {
            if !panel.delete(&id) {
                bail!("failed to delete '{id}'");
            }
            println!("deleted {id}");
        }
        HistoryCommand::Export { id, out } => {
            panel.export(&id, &out)?;
            println!("exported {id} to {}", out.display());
        }
        HistoryCommand::Send { id, target } => {
            panel.send_to(target, &id)?;
            println!("queued {id} for the {target}");
        }
        HistoryCommand::Variation { id } => {
            panel.variation(&id)?;
            println!("creator prompt set to: {}", panel.state().prompt);
        }
    }
    Ok(0)
}

fn run_clear(workspace: &Workspace, args: ClearArgs) -> Result<i32> {
    let gateway = Gateway::offline();
    match args.panel.trim().to_ascii_lowercase().as_str() {
        "creator" => CreatorPanel::mount(workspace.clone(), gateway)?.clear()?,
        "analyst" => AnalystPanel::mount(workspace.clone(), gateway)?.clear()?,
        "editor" => EditorPanel::mount(workspace.clone(), gateway)?.clear()?,
        "swapper" => SwapperPanel::mount(workspace.clone(), gateway)?.clear()?,
        other => bail!("unknown panel '{other}' (expected creator, analyst, editor or swapper)"),
    }
    println!("cleared {}", args.panel.trim());
    Ok(0)
}

fn read_image(path: &Path) -> Result<String> {
    read_file_as_data_uri(path).with_context(|| format!("failed to load image {}", path.display()))
}

fn read_strokes(path: &Path) -> Result<Vec<MaskStroke>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read strokes {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid strokes JSON in {}", path.display()))
}

fn parse_size(raw: &str) -> Result<(u32, u32)> {
    let normalized = raw.trim().to_ascii_lowercase();
    let Some((width, height)) = normalized.split_once('x') else {
        bail!("expected WIDTHxHEIGHT, got '{raw}'");
    };
    let width = width.trim().parse::<u32>().ok().filter(|value| *value > 0);
    let height = height.trim().parse::<u32>().ok().filter(|value| *value > 0);
    match (width, height) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => bail!("expected WIDTHxHEIGHT, got '{raw}'"),
    }
}

fn parse_garment_spec(raw: &str) -> Result<(GarmentKind, Option<String>)> {
    let (kind, value) = match raw.split_once('=') {
        Some((kind, value)) => (kind, Some(value.trim().to_string())),
        None => (raw, None),
    };
    let kind = kind.parse::<GarmentKind>().map_err(anyhow::Error::msg)?;
    Ok((kind, value.filter(|value| !value.is_empty())))
}

fn describe_image(image: &GeneratedImage) -> String {
    format!(
        "{}  {}x{}  {}",
        image.id, image.width, image.height, image.prompt
    )
}
