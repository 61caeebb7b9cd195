mod cli;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::{Args, Commands};
use scribe_ocr::{RecognitionLevel, RecognitionOptions};
use scribe_rs::batch::{recognize_files, FileOutcome};
use scribe_rs::{collect_images, logging, platform_engine, OcrService, ServiceConfig, SubmitOptions};
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
  let args = Args::parse();

  if let Err(e) = logging::init_tracing(args.verbose) {
    eprintln!("Error: {e:#}");
    return ExitCode::FAILURE;
  }

  match run(args.command).await {
    Ok(code) => code,
    Err(e) => {
      eprintln!("Error: {e:#}");
      ExitCode::FAILURE
    }
  }
}

async fn run(command: Commands) -> anyhow::Result<ExitCode> {
  match command {
    Commands::Version => {
      println!("scribe {}", env!("CARGO_PKG_VERSION"));
      Ok(ExitCode::SUCCESS)
    }
    Commands::Config { config } => {
      print!("{}", load_config(config.as_deref())?.to_toml()?);
      Ok(ExitCode::SUCCESS)
    }
    Commands::Recognize {
      paths,
      config,
      threshold,
      timeout_ms,
      max_in_flight,
      coalesce,
      fast,
      languages,
      json,
    } => {
      let images = collect_images(&paths)?;
      if images.is_empty() {
        anyhow::bail!("no image files found");
      }

      let mut config = load_config(config.as_deref())?;
      if let Some(threshold) = threshold {
        config.confidence_threshold = threshold;
      }
      if let Some(timeout_ms) = timeout_ms {
        config.request_timeout_ms = timeout_ms;
      }
      if let Some(max_in_flight) = max_in_flight {
        config.max_in_flight = max_in_flight;
      }
      config.coalesce_duplicates |= coalesce;

      let recognition = RecognitionOptions {
        level: if fast { RecognitionLevel::Fast } else { RecognitionLevel::Accurate },
        languages,
        ..RecognitionOptions::default()
      };

      let service = OcrService::new(config, platform_engine()?)?;
      info!(files = images.len(), "recognizing");
      let options = SubmitOptions {
        recognition,
        ..SubmitOptions::default()
      };
      let outcomes = recognize_files(&service, images, options).await;

      let mut failed = 0;
      for (path, outcome) in &outcomes {
        if outcome.is_err() {
          failed += 1;
        }
        report(path, outcome, json)?;
      }
      if failed > 0 {
        eprintln!("{failed} of {} images failed", outcomes.len());
        return Ok(ExitCode::FAILURE);
      }
      Ok(ExitCode::SUCCESS)
    }
  }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServiceConfig> {
  match path {
    Some(path) => ServiceConfig::from_file(path).with_context(|| format!("loading {}", path.display())),
    None => Ok(ServiceConfig::default()),
  }
}

fn report(path: &Path, outcome: &FileOutcome, as_json: bool) -> anyhow::Result<()> {
  if as_json {
    let doc = match outcome {
      Ok(output) => json!({ "path": path, "ok": true, "text": output.text, "observations": output.observations }),
      Err(e) => json!({ "path": path, "ok": false, "error": format!("{e:#}") }),
    };
    println!("{}", serde_json::to_string(&doc)?);
    return Ok(());
  }

  match outcome {
    Ok(output) => {
      println!("==> {} <==", path.display());
      if output.is_empty() {
        println!("(no text found)");
      } else {
        println!("{}", output.text);
      }
    }
    Err(e) => eprintln!("{}: {e:#}", path.display()),
  }
  Ok(())
}
