//! Command line front end for the file operation core

mod catalog;
mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qof_core::{
    ClientFactory, DefaultFileExtension, FileClient, FileDownload, FileOperationRequest, FileRecordRepositoryTrait,
    QofConfig, UploadBody,
};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use catalog::JsonCatalog;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => QofConfig::load_from(path),
        None => QofConfig::load(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let catalog = Arc::new(JsonCatalog::open(&cli.catalog).await?);
    info!(catalog = %catalog.path().display(), "Catalog loaded");

    let extension = Arc::new(DefaultFileExtension::new(catalog.clone()));
    let factory = ClientFactory::from_config(&config, extension)?;

    if let Command::List = cli.command {
        let records = catalog.list().await?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let client = factory.build_client(&cli.mode)?;

    match cli.command {
        Command::Upload {
            path,
            dir,
            station,
            file_type,
            owner,
            label,
        } => {
            let request = upload_request(&path, dir, station, file_type, owner, label).await?;
            let file = fs::File::open(&path)
                .await
                .with_context(|| format!("Cannot open {}", path.display()))?;

            let file_id = client.upload(UploadBody::seekable(file), request).await?;
            let record = catalog
                .get_by_file_id(file_id)
                .await?
                .context("Upload finished without a record")?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Download { file_id, out, as_owner } => {
            client.authorize(file_id, as_owner).await?;
            let download = client.download(file_id).await?;
            save_download(download, &out).await?;
        }
        Command::Preview { file_id, out, as_owner } => {
            client.authorize(file_id, as_owner).await?;
            let download = client.preview(file_id).await?;
            save_download(download, &out).await?;
        }
        Command::Delete { file_id } => {
            let deleted = client.delete(file_id).await?;
            println!("{}", serde_json::json!({ "file_id": file_id, "deleted": deleted }));
        }
        Command::Stations => print_stations(&client)?,
        Command::List => {}
    }

    Ok(())
}

async fn upload_request(
    path: &Path,
    dir: String,
    station: Option<String>,
    file_type: Option<String>,
    owner: Option<i64>,
    label: Option<String>,
) -> Result<FileOperationRequest> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;

    let size = fs::metadata(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?
        .len();

    let file_type = file_type.unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream().to_string());

    let mut request = FileOperationRequest::new(file_name, file_type, size).with_directory(dir);
    if let Some(station) = station {
        request = request.with_station(station);
    }
    if let Some(label) = label {
        request = request.with_label(label);
    }
    if let Some(owner) = owner {
        request = request.with_owner(owner).private();
    }

    Ok(request)
}

async fn save_download(mut download: FileDownload, out: &Path) -> Result<()> {
    let mut file = fs::File::create(out)
        .await
        .with_context(|| format!("Cannot create {}", out.display()))?;
    let written = tokio::io::copy(&mut download.stream, &mut file).await?;
    file.sync_all().await?;

    info!(file_id = download.record.file_id, bytes = written, out = %out.display(), "File saved");
    println!("{}", serde_json::to_string_pretty(&download.record)?);
    Ok(())
}

fn print_stations(client: &FileClient) -> Result<()> {
    let stations = client.stations();
    let entries: Vec<_> = stations
        .station_names()
        .into_iter()
        .filter_map(|name| stations.get(name))
        .map(|station| {
            serde_json::json!({
                "name": station.name,
                "default": station.name == stations.default_station(),
                "bucket_or_root": station.bucket_or_root,
                "path_prefix": station.path_prefix,
                "endpoint": station.endpoint,
                "region": station.region,
                "rate_limit": station.rate_limit,
            })
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "mode": client.mode(), "stations": entries }))?
    );
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };

        format!(
            "{}={},qof_core={}",
            env!("CARGO_CRATE_NAME").replace('-', "_"),
            default_level,
            default_level
        )
        .into()
    });

    // stdout carries command output, logs go to stderr
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let is_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    if is_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .init();
    }
}
