//! Remote synthesis over a submit-then-poll HTTP API.
//!
//! A prediction is created with `POST {endpoint}/v1/predictions`, then
//! `GET {endpoint}/v1/predictions/{id}` is polled until the service reports
//! a terminal status. Polling is an explicit state machine driven by an
//! injected clock so the schedule is testable without a live service.

use std::future::Future;
use std::time::{Duration, Instant};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{self, SynthAudio};
use crate::config::RemoteProviderConfig;
use crate::error::{Error, Result};
use crate::provider::{SynthRequest, Synthesizer};
use crate::voice::VoiceReference;

/// Consecutive transport failures tolerated before the poll gives up.
const MAX_CONSECUTIVE_POLL_ERRORS: u32 = 5;

/// Poll interval growth applied after each transport failure.
const POLL_BACKOFF_FACTOR: f64 = 1.5;

const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Time source for the poll loop. Production uses the tokio clock; tests
/// drive a manual one.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest {
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    text: String,
    reference_audio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_text: Option<String>,
}

/// What the service reports for a prediction at one point in time.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionSnapshot {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<PredictionOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

/// Services return the artifact either as a bare URL string or wrapped in
/// an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Url(String),
    Audio { audio_url: String },
}

impl PredictionOutput {
    fn into_url(self) -> String {
        match self {
            PredictionOutput::Url(url) => url,
            PredictionOutput::Audio { audio_url } => audio_url,
        }
    }
}

/// One observation fed into the poll state machine.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Snapshot(PredictionSnapshot),
    TransportError(String),
}

/// Where a prediction stands. Transport errors are tolerated up to a
/// consecutive budget, with multiplicative backoff on the interval; any
/// successful poll resets the error count.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Polling {
        polls: u32,
        consecutive_errors: u32,
        interval: Duration,
    },
    Succeeded {
        audio_url: String,
    },
    Failed {
        message: String,
    },
}

impl PollState {
    pub fn new(interval: Duration) -> Self {
        PollState::Polling {
            polls: 0,
            consecutive_errors: 0,
            interval,
        }
    }

    pub fn advance(self, outcome: PollOutcome) -> PollState {
        let (polls, consecutive_errors, interval) = match self {
            PollState::Polling {
                polls,
                consecutive_errors,
                interval,
            } => (polls, consecutive_errors, interval),
            terminal => return terminal,
        };

        match outcome {
            PollOutcome::Snapshot(snapshot) => match snapshot.status {
                PredictionStatus::Succeeded => match snapshot.output {
                    Some(output) => PollState::Succeeded {
                        audio_url: output.into_url(),
                    },
                    None => PollState::Failed {
                        message: "Prediction succeeded without output".to_string(),
                    },
                },
                PredictionStatus::Failed => PollState::Failed {
                    message: snapshot
                        .error
                        .unwrap_or_else(|| "Prediction failed".to_string()),
                },
                PredictionStatus::Canceled => PollState::Failed {
                    message: "Prediction was canceled".to_string(),
                },
                PredictionStatus::Starting | PredictionStatus::Processing => {
                    PollState::Polling {
                        polls: polls + 1,
                        consecutive_errors: 0,
                        interval,
                    }
                }
            },
            PollOutcome::TransportError(message) => {
                let errors = consecutive_errors + 1;
                if errors > MAX_CONSECUTIVE_POLL_ERRORS {
                    PollState::Failed {
                        message: format!(
                            "Polling failed after {errors} consecutive errors: {message}"
                        ),
                    }
                } else {
                    PollState::Polling {
                        polls: polls + 1,
                        consecutive_errors: errors,
                        interval: grow_interval(interval),
                    }
                }
            }
        }
    }
}

fn grow_interval(interval: Duration) -> Duration {
    interval.mul_f64(POLL_BACKOFF_FACTOR).min(MAX_POLL_INTERVAL)
}

/// Run the state machine to a terminal state, sleeping one interval before
/// each fetch. Exceeding `max_wait` is a synthesis timeout.
pub async fn poll_until_terminal<C, F, Fut>(
    clock: &C,
    max_wait: Duration,
    initial: PollState,
    mut fetch: F,
) -> Result<String>
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PredictionSnapshot>>,
{
    let started = clock.now();
    let mut state = initial;
    loop {
        state = match state {
            PollState::Succeeded { audio_url } => return Ok(audio_url),
            PollState::Failed { message } => return Err(Error::Synthesis(message)),
            PollState::Polling {
                polls,
                consecutive_errors,
                interval,
            } => {
                if clock.now().duration_since(started) >= max_wait {
                    return Err(Error::SynthesisTimeout(max_wait));
                }
                clock.sleep(interval).await;
                let outcome = match fetch().await {
                    Ok(snapshot) => PollOutcome::Snapshot(snapshot),
                    Err(err) => PollOutcome::TransportError(err.to_string()),
                };
                PollState::Polling {
                    polls,
                    consecutive_errors,
                    interval,
                }
                .advance(outcome)
            }
        };
    }
}

pub struct RemoteProvider<C: Clock = TokioClock> {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    poll_interval: Duration,
    max_poll: Duration,
    clock: C,
}

impl RemoteProvider<TokioClock> {
    pub fn from_config(config: &RemoteProviderConfig) -> Result<Self> {
        let endpoint = config.endpoint.as_ref().ok_or_else(|| {
            Error::Config("Remote provider selected but no endpoint set".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll: Duration::from_secs(config.max_poll_secs),
            clock: TokioClock,
        })
    }
}

impl<C: Clock> RemoteProvider<C> {
    async fn submit(&self, request: &SynthRequest) -> Result<PredictionSnapshot> {
        let payload = PredictionRequest {
            input: PredictionInput {
                text: request.text.clone(),
                reference_audio: encode_reference(&request.voice),
                reference_text: request.voice.transcript.clone(),
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/predictions", self.endpoint))
            .json(&payload);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            Error::Network(format!("Failed to reach synthesis service: {e}"))
        })?;
        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "Synthesis service rejected the request: HTTP {}",
                response.status()
            )));
        }
        response.json::<PredictionSnapshot>().await.map_err(|e| {
            Error::Synthesis(format!("Malformed prediction response: {e}"))
        })
    }

    async fn fetch(&self, id: &str) -> Result<PredictionSnapshot> {
        let mut builder = self
            .client
            .get(format!("{}/v1/predictions/{id}", self.endpoint));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("Poll request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "Poll returned HTTP {}",
                response.status()
            )));
        }
        response.json::<PredictionSnapshot>().await.map_err(|e| {
            Error::Synthesis(format!("Malformed prediction response: {e}"))
        })
    }

    async fn download(&self, url: &str) -> Result<SynthAudio> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download audio: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "Audio download returned HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read audio body: {e}")))?;
        audio::decode_wav_bytes(&bytes)
    }
}

impl<C: Clock> Synthesizer for RemoteProvider<C> {
    async fn synthesize(&self, request: &SynthRequest) -> Result<SynthAudio> {
        let submitted = self.submit(request).await?;
        debug!(
            request_id = %request.request_id,
            prediction = %submitted.id,
            "prediction submitted"
        );

        let id = submitted.id.clone();
        let initial =
            PollState::new(self.poll_interval).advance(PollOutcome::Snapshot(submitted));
        let audio_url =
            poll_until_terminal(&self.clock, self.max_poll, initial, || self.fetch(&id))
                .await?;
        self.download(&audio_url).await
    }
}

/// Reference clip as a base64 data URI, the shape the prediction API
/// expects.
fn encode_reference(voice: &VoiceReference) -> String {
    let mime = match voice.extension().as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mp3",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(&voice.bytes);
    format!("data:{mime};base64,{encoded}")
}
