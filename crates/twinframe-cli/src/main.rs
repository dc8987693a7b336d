use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use twinframe_contracts::config::StudioConfig;
use twinframe_contracts::files::LocalFile;
use twinframe_contracts::generation::PresetRegistry;
use twinframe_engine::{
    default_generator_registry, DownloadClient, DownloadedImage, ImageDownloader, Studio,
};

#[derive(Debug, Parser)]
#[command(name = "twinframe", version, about = "Two-reference image generation from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload the reference images and generate one picture from them.
    Generate(GenerateArgs),
    /// Fetch an image through the download proxy.
    Download(DownloadArgs),
    /// List the prompt presets.
    Modes,
}

#[derive(Debug, Default, Args)]
struct EndpointArgs {
    /// Base URL for every endpoint [env: TWINFRAME_API_BASE]
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    upload_url: Option<String>,
    #[arg(long)]
    generate_url: Option<String>,
    #[arg(long)]
    download_url: Option<String>,
    /// Storage folder sent with each upload [env: TWINFRAME_UPLOAD_FOLDER]
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    /// One path per reference slot, in slot order.
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long, conflicts_with = "mode")]
    prompt: Option<String>,
    /// Preset key, see `twinframe modes`.
    #[arg(long)]
    mode: Option<String>,
    #[arg(long, default_value = "http")]
    provider: String,
    /// Also download the result to this file or directory.
    #[arg(long)]
    download: Option<PathBuf>,
    #[command(flatten)]
    endpoints: EndpointArgs,
}

#[derive(Debug, Parser)]
struct DownloadArgs {
    #[arg(long)]
    url: String,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    endpoints: EndpointArgs,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("twinframe error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("twinframe=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args).await,
        Command::Download(args) => run_download(args).await,
        Command::Modes => {
            for preset in PresetRegistry::default().list() {
                println!("{}\t{}", preset.key, preset.title);
            }
            Ok(())
        }
    }
}

async fn run_generate(args: GenerateArgs) -> Result<()> {
    let config = studio_config(&args.endpoints);
    if args.images.len() != config.slot_count {
        bail!(
            "expected {} --image paths, got {}",
            config.slot_count,
            args.images.len()
        );
    }

    let registry = default_generator_registry(&config.generate_url);
    let generator = registry.get(&args.provider).ok_or_else(|| {
        anyhow!(
            "unknown provider '{}' (expected one of: {})",
            args.provider,
            registry.names().join(", ")
        )
    })?;
    let studio = Studio::from_config(&config).with_generator(generator);

    for (index, path) in args.images.iter().enumerate() {
        let file = LocalFile::from_path(path)?;
        studio
            .set_slot(index, Some(file))
            .with_context(|| format!("slot {index} ({})", path.display()))?;
    }

    let prompt = resolve_prompt(&studio, args.prompt.as_deref(), args.mode.as_deref())?;
    debug!(provider = %args.provider, "starting generation");

    let (image_url, revised_prompt) = studio
        .generate(&prompt)
        .await
        .into_image()?
        .ok_or_else(|| anyhow!("generation finished without an image"))?;

    let mut summary = json!({
        "image_url": image_url,
        "revised_prompt": revised_prompt,
    });
    if let Some(target) = &args.download {
        let image = studio
            .download_result()
            .await?
            .ok_or_else(|| anyhow!("no generated image to download"))?;
        let path = save_image(target, &image)?;
        summary["saved_to"] = Value::String(path.display().to_string());
    }
    studio.teardown();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_download(args: DownloadArgs) -> Result<()> {
    let config = studio_config(&args.endpoints);
    let client = DownloadClient::new(config.download_url);
    let image = client.download(&args.url).await?;
    let path = save_image(&args.out, &image)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "saved_to": path.display().to_string(),
            "content_type": image.content_type,
            "bytes": image.data.len(),
        }))?
    );
    Ok(())
}

/// Environment first, then flags on top.
fn studio_config(endpoints: &EndpointArgs) -> StudioConfig {
    let mut config = match &endpoints.api_base {
        Some(base) => StudioConfig::with_api_base(base),
        None => StudioConfig::from_env(),
    };
    if let Some(url) = &endpoints.upload_url {
        config.upload_url = url.clone();
    }
    if let Some(url) = &endpoints.generate_url {
        config.generate_url = url.clone();
    }
    if let Some(url) = &endpoints.download_url {
        config.download_url = url.clone();
    }
    if let Some(folder) = &endpoints.folder {
        config.upload_folder = Some(folder.clone()).filter(|folder| !folder.trim().is_empty());
    }
    config
}

fn resolve_prompt(studio: &Studio, prompt: Option<&str>, mode: Option<&str>) -> Result<String> {
    if let Some(prompt) = prompt {
        return Ok(prompt.to_string());
    }
    let key = match mode {
        Some(key) => key.to_string(),
        None => studio
            .presets()
            .default_preset()
            .map(|preset| preset.key.clone())
            .ok_or_else(|| anyhow!("no prompt given and no default mode"))?,
    };
    studio
        .select_mode(&key)
        .ok_or_else(|| anyhow!("unknown mode '{key}'"))
}

/// Writes the image to `target`, or into it when `target` is a directory.
fn save_image(target: &Path, image: &DownloadedImage) -> Result<PathBuf> {
    let path = if target.is_dir() {
        target.join(&image.filename)
    } else {
        target.to_path_buf()
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    fs::write(&path, &image.data).with_context(|| format!("failed writing {}", path.display()))?;
    info!(path = %path.display(), bytes = image.data.len(), "image saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use twinframe_contracts::generation::presets::{CELEBRITY_PROMPT, SELF_PROMPT};

    use super::*;

    fn studio() -> Studio {
        Studio::from_config(&StudioConfig::default())
    }

    fn image() -> DownloadedImage {
        DownloadedImage {
            filename: "out.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        }
    }

    #[test]
    fn explicit_prompt_wins() -> Result<()> {
        assert_eq!(resolve_prompt(&studio(), Some("hello"), None)?, "hello");
        Ok(())
    }

    #[test]
    fn mode_selects_preset_prompt() -> Result<()> {
        let studio = studio();
        assert_eq!(resolve_prompt(&studio, None, Some("celebrity"))?, CELEBRITY_PROMPT);
        assert_eq!(studio.selected_mode().as_deref(), Some("celebrity"));
        assert_eq!(resolve_prompt(&studio, None, None)?, SELF_PROMPT);
        Ok(())
    }

    #[test]
    fn unknown_mode_is_an_error() {
        let err = resolve_prompt(&studio(), None, Some("pirate"))
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("unknown mode 'pirate'"));
    }

    #[test]
    fn endpoint_flags_override_base() {
        let config = studio_config(&EndpointArgs {
            api_base: Some("https://studio.example.com/".to_string()),
            generate_url: Some("https://gen.example.com/run".to_string()),
            folder: Some(" ".to_string()),
            ..EndpointArgs::default()
        });
        assert_eq!(config.upload_url, "https://studio.example.com/api/storage/upload");
        assert_eq!(config.generate_url, "https://gen.example.com/run");
        assert_eq!(config.download_url, "https://studio.example.com/api/download-image");
        assert_eq!(config.upload_folder, None);
    }

    #[test]
    fn save_image_into_directory_uses_served_name() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = save_image(temp.path(), &image())?;
        assert_eq!(path, temp.path().join("out.png"));
        assert_eq!(fs::read(&path)?, vec![1u8, 2, 3]);

        let nested = temp.path().join("renders/final.png");
        assert_eq!(save_image(&nested, &image())?, nested);
        assert!(nested.exists());
        Ok(())
    }

    #[test]
    fn generate_args_parse_repeated_images() -> Result<()> {
        let cli = Cli::try_parse_from([
            "twinframe",
            "generate",
            "--image",
            "a.jpg",
            "--image",
            "b.jpg",
            "--mode",
            "self",
            "--provider",
            "dryrun",
        ])?;
        let Command::Generate(args) = cli.command else {
            bail!("expected generate");
        };
        assert_eq!(args.images, vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")]);
        assert_eq!(args.mode.as_deref(), Some("self"));
        assert_eq!(args.provider, "dryrun");
        Ok(())
    }

    #[test]
    fn prompt_and_mode_conflict() {
        let parsed = Cli::try_parse_from([
            "twinframe", "generate", "--image", "a.jpg", "--prompt", "hi", "--mode", "self",
        ]);
        assert!(parsed.is_err());
    }
}
