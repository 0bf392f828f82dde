//! Forecast service: model lookup, forecasting and background jobs

use crate::config::{EngineSettings, ForecastConfig};
use crate::data::{resolve_target_column, TimeSeriesFrame};
use crate::engine::{ForecastEngine, ForecastOutput};
use crate::error::{ForecastError, Result};
use crate::jobs::{JobRecord, JobStore};
use crate::store::ModelStore;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};
use uuid::Uuid;

/// What to forecast and with which model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    /// Name of the model in the store
    pub model_name: String,
    /// Requested target column; empty means the model's own target
    pub target_column: String,
    /// Horizon, interval and confidence level
    #[serde(flatten)]
    pub config: ForecastConfig,
}

impl ForecastRequest {
    /// Create a request for `model_name`
    pub fn new(
        model_name: impl Into<String>,
        target_column: impl Into<String>,
        config: ForecastConfig,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            target_column: target_column.into(),
            config,
        }
    }
}

/// Handle to a submitted job
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    worker: JoinHandle<()>,
}

impl JobHandle {
    /// Job identifier to poll with
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the worker to finish writing the job record
    pub fn join(self) -> Result<()> {
        self.worker
            .join()
            .map_err(|_| ForecastError::JobError(format!("Worker for job {} panicked", self.id)))
    }
}

/// Runs forecasts against an injected model store and job store
pub struct ForecastService<S, J> {
    models: Arc<S>,
    jobs: Arc<J>,
    engine: Arc<ForecastEngine>,
}

impl<S, J> Clone for ForecastService<S, J> {
    fn clone(&self) -> Self {
        Self {
            models: Arc::clone(&self.models),
            jobs: Arc::clone(&self.jobs),
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S, J> ForecastService<S, J>
where
    S: ModelStore + 'static,
    J: JobStore + 'static,
{
    /// Create a service over the given stores.
    ///
    /// The engine is built once from `settings` and shared by every job.
    pub fn new(models: Arc<S>, jobs: Arc<J>, settings: EngineSettings) -> Self {
        Self {
            models,
            jobs,
            engine: Arc::new(ForecastEngine::new(settings)),
        }
    }

    /// The model store
    pub fn models(&self) -> &S {
        &self.models
    }

    /// The engine
    pub fn engine(&self) -> &ForecastEngine {
        &self.engine
    }

    /// Run a forecast on the calling thread
    pub fn forecast(
        &self,
        request: &ForecastRequest,
        frame: &TimeSeriesFrame,
    ) -> Result<ForecastOutput> {
        run_pipeline(self.models.as_ref(), &self.engine, request, frame)
    }

    /// Start a forecast on a worker thread and return its job handle.
    ///
    /// The pending record is written before this returns; the worker writes
    /// the final record.
    pub fn submit(&self, request: ForecastRequest, frame: TimeSeriesFrame) -> Result<JobHandle> {
        let id = Uuid::new_v4().to_string();
        let meta = serde_json::to_value(&request)?;
        self.jobs.write_pending(&id, meta)?;

        let models = Arc::clone(&self.models);
        let jobs = Arc::clone(&self.jobs);
        let engine = Arc::clone(&self.engine);
        let job_id = id.clone();

        let worker = thread::Builder::new()
            .name(format!("forecast-{}", &id[..8]))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    run_pipeline(models.as_ref(), &engine, &request, &frame)
                }))
                .unwrap_or_else(|_| {
                    Err(ForecastError::JobError(
                        "Forecast worker panicked".to_string(),
                    ))
                });
                let written = match outcome {
                    Ok(output) => {
                        info!("Job {} done ({} rows)", job_id, output.rows.len());
                        jobs.write_result(&job_id, output)
                    }
                    Err(e) => {
                        error!("Job {} failed: {}", job_id, e);
                        jobs.write_error(&job_id, &e.to_string())
                    }
                };
                if let Err(e) = written {
                    error!("Could not record outcome of job {}: {}", job_id, e);
                }
            })?;

        Ok(JobHandle { id, worker })
    }

    /// Current record of a job
    pub fn status(&self, job_id: &str) -> Result<JobRecord> {
        self.jobs
            .read(job_id)?
            .ok_or_else(|| ForecastError::JobError(format!("Unknown job '{}'", job_id)))
    }
}

fn run_pipeline<S: ModelStore + ?Sized>(
    models: &S,
    engine: &ForecastEngine,
    request: &ForecastRequest,
    frame: &TimeSeriesFrame,
) -> Result<ForecastOutput> {
    request.config.validate()?;

    let artifact = models.load_artifact(&request.model_name)?;

    let requested = if request.target_column.trim().is_empty() {
        artifact.metadata().target_column.clone().unwrap_or_default()
    } else {
        request.target_column.clone()
    };
    let target = resolve_target_column(frame, &requested)?;
    if target != requested {
        info!("Using column '{}' for requested target '{}'", target, requested);
    }

    let mut frame = frame.clone();
    frame.coerce_numeric(&target)?;
    let frame = frame.ensure_datetime_index();

    let forecast = engine.run(&artifact, &frame, &target, &request.config)?;
    let metrics = engine.summarize(&frame, &forecast, &target);

    Ok(ForecastOutput {
        rows: forecast.rows(),
        metrics,
    })
}
