//! Command-line driver: runs one pipeline end to end.
//!
//! Uploads the given CSV, submits a pipeline, waits for completion, and
//! prints the report as JSON.

use anyhow::{bail, Context};
use automl_client::{
    AutomlClient, ClientConfig, ClientMessage, ModelKind, PipelineConfig, RunPhase, TaskType,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

struct CliArgs {
    file: PathBuf,
    target_column: String,
    task_type: TaskType,
    model: ModelKind,
    dataset_name: Option<String>,
    sep: String,
    base_url: Option<String>,
}

const USAGE: &str = "\
Usage: automl-client <file.csv> --target <column> [options]

Options:
  --target <column>      Column to predict (required)
  --task <kind>          classification (default) or regression
  --model <name>         Model to train, e.g. \"Random Forest\" (default)
  --name <name>          Dataset display name (default: file stem)
  --sep <char>           Field separator (default: ,)
  --url <base-url>       Service base URL (overrides config file)
";

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut file = None;
    let mut target_column = None;
    let mut task_type = TaskType::Classification;
    let mut model = None;
    let mut dataset_name = None;
    let mut sep = ",".to_string();
    let mut base_url = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--target" => target_column = args.next(),
            "--task" => {
                task_type = match args.next().as_deref() {
                    Some("classification") => TaskType::Classification,
                    Some("regression") => TaskType::Regression,
                    other => bail!("unknown task type {:?}\n{}", other, USAGE),
                }
            }
            "--model" => {
                let name = args.next().unwrap_or_default();
                model = Some(
                    ModelKind::from_api_name(&name)
                        .with_context(|| format!("unknown model {:?}", name))?,
                );
            }
            "--name" => dataset_name = args.next(),
            "--sep" => sep = args.next().unwrap_or_default(),
            "--url" => base_url = args.next(),
            "--help" | "-h" => {
                print!("{}", USAGE);
                std::process::exit(0);
            }
            other if file.is_none() => file = Some(PathBuf::from(other)),
            other => bail!("unexpected argument {:?}\n{}", other, USAGE),
        }
    }

    let file = file.with_context(|| format!("no input file given\n{}", USAGE))?;
    let target_column = target_column.with_context(|| format!("--target is required\n{}", USAGE))?;
    Ok(CliArgs {
        file,
        target_column,
        task_type,
        model: model.unwrap_or(ModelKind::RandomForest),
        dataset_name,
        sep,
        base_url,
    })
}

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,automl_client=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;

    let mut config = ClientConfig::load_or_default();
    if let Some(url) = &args.base_url {
        config.server.base_url = url.clone();
    }

    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset.csv".to_string());
    let dataset_name = args.dataset_name.clone().unwrap_or_else(|| {
        args.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string())
    });

    let pipeline = PipelineConfig {
        dataset_name,
        sep: args.sep.clone(),
        task_type: args.task_type,
        target_column: args.target_column.clone(),
        model_name: args.model,
    };

    info!("Connecting to {}", config.server.base_url);
    let (client, session) = AutomlClient::new(config);
    let worker = std::thread::spawn(move || client.run());

    session.start_upload(bytes, filename)?;

    let mut submitted = false;
    let mut report = None;
    let mut failure = None;
    'outer: loop {
        for message in session.drain() {
            match message {
                ClientMessage::Lifecycle(snapshot) => match snapshot.phase {
                    RunPhase::Uploaded if !submitted => {
                        info!("Dataset registered as {:?}", snapshot.dataset_id);
                        session.submit(pipeline.clone())?;
                        submitted = true;
                    }
                    RunPhase::Polling => {
                        if let Some(status) = &snapshot.last_status {
                            info!("Task status: {}", status);
                        }
                    }
                    RunPhase::Done => {
                        info!("Pipeline finished, fetching report");
                        session.fetch_report()?;
                    }
                    RunPhase::Failed => {
                        failure = Some(
                            snapshot
                                .last_error
                                .unwrap_or_else(|| "pipeline failed".to_string()),
                        );
                        break 'outer;
                    }
                    _ => {}
                },
                ClientMessage::Metadata(metadata) => {
                    info!("Dataset columns: {}", metadata.columns.join(", "));
                }
                ClientMessage::ReportPending { report_id } => {
                    info!("Report {} not ready yet, retrying", report_id);
                    std::thread::sleep(Duration::from_secs(1));
                    session.fetch_report()?;
                }
                ClientMessage::Report(payload) => {
                    report = Some(payload);
                    break 'outer;
                }
                ClientMessage::Error(message) => error!("{}", message),
                _ => {}
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    session.shutdown()?;
    let _ = worker.join();

    match (report, failure) {
        (Some(payload), _) => {
            println!("{}", serde_json::to_string_pretty(&payload.data)?);
            Ok(())
        }
        (None, Some(message)) => bail!("pipeline failed: {}", message),
        (None, None) => bail!("worker exited without a result"),
    }
}
