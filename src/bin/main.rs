use std::sync::Arc;

use anyhow::{Context, Error};
use clap::Parser;
use config::Config;
use log::info;

use mediaprobe::settings::Settings;
use mediaprobe::{MetadataService, PassthroughCache, ProbeError};

#[derive(Parser, Debug)]
#[command(version, about = "Probe media dimensions without downloading or decoding")]
struct Args {
    #[arg(long)]
    pub config: Option<String>,

    /// Local paths or URLs to probe
    #[arg(required = true)]
    pub locators: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    pretty_env_logger::init();

    let args: Args = Args::parse();

    let mut builder = Config::builder();
    if let Some(ref c) = args.config {
        builder = builder.add_source(config::File::with_name(c.as_str()));
    }
    let builder = builder
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = builder.try_deserialize().context("invalid configuration")?;

    let cache = Arc::new(PassthroughCache::new(
        settings.media_root.clone(),
        settings.serve_images,
    ));
    let service = match MetadataService::new(cache, &settings) {
        Ok(service) => service,
        Err(e @ ProbeError::UtilityMissing) => {
            return Err(e).context(
                "video probing requires ffmpeg; install it or set ffprobe_path in the config",
            );
        }
        Err(e) => return Err(e.into()),
    };

    for locator in &args.locators {
        info!("probing {locator}");
        let metadata = service.probe_metadata(locator).await;
        println!("{}", serde_json::to_string(&metadata)?);
    }

    Ok(())
}
