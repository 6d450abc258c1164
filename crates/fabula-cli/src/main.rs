//! Command-line client for the Fabula server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::Deserialize;

#[derive(Parser)]
#[command(
    name = "fabula",
    version,
    about = "Convert documents into voice-cloned audiobooks",
    arg_required_else_help = true,
    propagate_version = true
)]
struct Cli {
    /// Server base URL
    #[arg(
        long,
        global = true,
        value_name = "URL",
        default_value = "http://localhost:8080",
        env = "FABULA_SERVER"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a document and voice sample, then start a conversion job
    Submit {
        /// Document to convert (pdf, txt, or md)
        document: PathBuf,
        /// Voice reference clip (wav, mp3, m4a, or ogg)
        voice: PathBuf,
        /// Transcript of the voice clip, forwarded to the synthesizer
        #[arg(short, long)]
        transcript: Option<String>,
        /// Block until the job finishes
        #[arg(short, long)]
        wait: bool,
    },
    /// Show the current state of a job
    Status {
        /// Job id returned by submit
        id: String,
    },
    /// Poll a job until it completes or fails
    Wait {
        /// Job id returned by submit
        id: String,
        /// Seconds between polls
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },
    /// Check that the server is reachable
    Health,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
    filename: String,
    bytes: usize,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    id: String,
    status: String,
    progress: u8,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let server = cli.server.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Submit {
            document,
            voice,
            transcript,
            wait,
        } => submit(&client, &server, &document, &voice, transcript, wait).await,
        Commands::Status { id } => {
            let job = fetch_job(&client, &server, &id).await?;
            print_job(&server, &job);
            Ok(())
        }
        Commands::Wait { id, interval } => {
            wait_for_job(&client, &server, &id, interval).await
        }
        Commands::Health => health(&client, &server).await,
    }
}

async fn submit(
    client: &Client,
    server: &str,
    document: &Path,
    voice: &Path,
    transcript: Option<String>,
    wait: bool,
) -> Result<()> {
    let document_id = upload_file(client, server, "document", document).await?;
    println!("Uploaded document: {document_id}");
    let voice_id = upload_file(client, server, "voice", voice).await?;
    println!("Uploaded voice sample: {voice_id}");

    let mut body = serde_json::json!({
        "document_id": document_id,
        "voice_id": voice_id,
    });
    if let Some(transcript) = transcript {
        body["voice_transcript"] = serde_json::Value::String(transcript);
    }

    let response = client
        .post(format!("{server}/api/v1/jobs"))
        .json(&body)
        .send()
        .await
        .context("failed to reach the server")?;
    if !response.status().is_success() {
        bail!(
            "job submission rejected: {}",
            response.text().await.unwrap_or_default()
        );
    }
    let job: JobResponse = response
        .json()
        .await
        .context("failed to parse job response")?;
    println!("Job accepted: {}", job.id);

    if wait {
        wait_for_job(client, server, &job.id, 2).await
    } else {
        println!("Poll with: fabula wait {}", job.id);
        Ok(())
    }
}

async fn upload_file(
    client: &Client,
    server: &str,
    kind: &str,
    path: &Path,
) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = client
        .post(format!("{server}/api/v1/uploads/{kind}"))
        .multipart(form)
        .send()
        .await
        .context("failed to reach the server")?;
    if !response.status().is_success() {
        bail!(
            "{kind} upload rejected: {}",
            response.text().await.unwrap_or_default()
        );
    }
    let upload: UploadResponse = response
        .json()
        .await
        .context("failed to parse upload response")?;
    println!("  {} ({} bytes)", upload.filename, upload.bytes);
    Ok(upload.id)
}

async fn wait_for_job(client: &Client, server: &str, id: &str, interval: u64) -> Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    loop {
        let job = fetch_job(client, server, id).await?;
        bar.set_position(job.progress as u64);
        bar.set_message(job.status.clone());

        if job.status == "completed" || job.status == "failed" {
            bar.finish_and_clear();
            print_job(server, &job);
            if job.status == "failed" {
                bail!("job {id} failed");
            }
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
    }
}

async fn fetch_job(client: &Client, server: &str, id: &str) -> Result<JobResponse> {
    let response = client
        .get(format!("{server}/api/v1/jobs/{id}"))
        .send()
        .await
        .context("failed to reach the server")?;
    if !response.status().is_success() {
        bail!(
            "job lookup failed: {}",
            response.text().await.unwrap_or_default()
        );
    }
    response.json().await.context("failed to parse job response")
}

async fn health(client: &Client, server: &str) -> Result<()> {
    let response = client
        .get(format!("{server}/api/v1/health"))
        .send()
        .await
        .context("failed to reach the server")?;
    let body: serde_json::Value = response
        .json()
        .await
        .context("failed to parse health response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn print_job(server: &str, job: &JobResponse) {
    println!("Job:      {}", job.id);
    println!("Status:   {}", job.status);
    println!("Progress: {}%", job.progress);
    if let Some(url) = &job.audio_url {
        if url.starts_with('/') {
            println!("Audio:    {server}{url}");
        } else {
            println!("Audio:    {url}");
        }
    }
    if let Some(error) = &job.error {
        println!("Error:    {error}");
    }
}
