//! The dispatcher: routes one delivered queue message through the process
//! or generate workflow.
//!
//! Propagation policy: process-phase fatal errors (bad token, missing
//! data) surface as `Err` so the transport can retry and eventually
//! dead-letter the message. Generate-phase fatal errors are absorbed into
//! the job's terminal `GENERATION_FAIL` state and the message is
//! acknowledged — a failed render is a completed attempt, not a
//! processing fault, and retrying it would loop a systematically bad
//! document through redelivery.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    composition::{expand::expand, model::LayoutDocument},
    foundation::error::{FeedforgeError, FeedforgeResult},
    render::{engine::CompositionEngine, raster},
    store::{
        catalog::CatalogStore,
        jobs::{ClaimOutcome, Job, JobStatus, JobStore, NewJob},
        object::{ObjectStore, output_object_key},
    },
    worker::{
        auth::TokenValidator,
        message::{GenerateRequest, ProcessRequest, QueueMessage, QueueSink},
    },
};

/// Deterministic namespace for per-product job ids: the same
/// (subject, template, outfeed, product) tuple always yields the same job,
/// so reprocessing an outfeed upserts rather than duplicates.
const JOB_ID_NAMESPACE: Uuid = Uuid::NAMESPACE_DNS;

/// How one message was handled; every variant is an acknowledged message.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// Process phase: jobs created and generate messages emitted.
    Processed {
        outfeed_id: String,
        jobs_enqueued: usize,
    },
    /// Generate phase: the job rendered and published successfully.
    Generated { job_id: Uuid, output_ref: String },
    /// Generate phase: the attempt failed and the job records why.
    Failed { job_id: Uuid, detail: String },
    /// Generate phase: the job was not claimable; nothing happened.
    Skipped {
        job_id: Uuid,
        status: Option<JobStatus>,
    },
}

pub struct Dispatcher {
    catalog: Arc<dyn CatalogStore>,
    jobs: Arc<dyn JobStore>,
    output: Arc<dyn ObjectStore>,
    queue: Arc<dyn QueueSink>,
    validator: Arc<dyn TokenValidator>,
    engine: CompositionEngine,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        jobs: Arc<dyn JobStore>,
        output: Arc<dyn ObjectStore>,
        queue: Arc<dyn QueueSink>,
        validator: Arc<dyn TokenValidator>,
        engine: CompositionEngine,
    ) -> Self {
        Self {
            catalog,
            jobs,
            output,
            queue,
            validator,
            engine,
        }
    }

    /// Handle one raw queue message body.
    pub async fn handle(&self, raw: &str) -> FeedforgeResult<DispatchOutcome> {
        match QueueMessage::decode(raw)? {
            QueueMessage::Process(request) => self.handle_process(request).await,
            QueueMessage::Generate(request) => self.handle_generate(request).await,
        }
    }

    async fn handle_process(&self, request: ProcessRequest) -> FeedforgeResult<DispatchOutcome> {
        info!(
            outfeed_id = request.outfeed_id.as_str(),
            template_id = request.user_template_id.as_str(),
            "process workflow started"
        );

        let subject_id = self.validator.validate(&request.access_token).await?;
        let template_json = self
            .catalog
            .fetch_template(&subject_id, &request.user_template_id)
            .await?;
        let template = LayoutDocument::from_json(template_json)
            .map_err(|e| FeedforgeError::data_fetch(format!("stored template rejected: {e}")))?;
        let fields = self.catalog.fetch_fields().await?;
        let products = self.catalog.fetch_products(&subject_id).await?;
        info!(
            fields = fields.len(),
            products = products.len(),
            "fetched expansion inputs"
        );

        let mut jobs_enqueued = 0;
        for item in expand(&template, &fields, &products) {
            let Some(product_id) = item.product_id else {
                warn!("product record has no id column, skipping job creation");
                continue;
            };

            let seed = format!(
                "{subject_id}-{}-{}-{product_id}",
                request.user_template_id, request.outfeed_id
            );
            let job_id = Uuid::new_v5(&JOB_ID_NAMESPACE, seed.as_bytes());
            let document = serde_json::to_value(&item.document)
                .map_err(|e| FeedforgeError::serde(e.to_string()))?;

            self.jobs
                .upsert_processed(NewJob {
                    id: job_id,
                    document,
                    outfeed_id: request.outfeed_id.clone(),
                    template_id: request.user_template_id.clone(),
                    subject_id: subject_id.clone(),
                })
                .await?;
            self.queue
                .send(&QueueMessage::Generate(GenerateRequest {
                    generated_feed_id: job_id,
                }))
                .await?;
            jobs_enqueued += 1;
        }

        info!(
            outfeed_id = request.outfeed_id.as_str(),
            jobs_enqueued, "process workflow completed"
        );
        Ok(DispatchOutcome::Processed {
            outfeed_id: request.outfeed_id,
            jobs_enqueued,
        })
    }

    async fn handle_generate(&self, request: GenerateRequest) -> FeedforgeResult<DispatchOutcome> {
        let job_id = request.generated_feed_id;

        let job = match self.jobs.claim(job_id).await? {
            ClaimOutcome::Claimed(job) => job,
            ClaimOutcome::Skip { current } => {
                info!(%job_id, status = ?current, "job not claimable, skipping");
                return Ok(DispatchOutcome::Skipped {
                    job_id,
                    status: current,
                });
            }
        };

        match self.render_and_publish(&job).await {
            Ok(output_ref) => {
                self.jobs.complete(job_id, &output_ref).await?;
                info!(%job_id, output_ref = output_ref.as_str(), "generate workflow completed");
                Ok(DispatchOutcome::Generated { job_id, output_ref })
            }
            Err(detail) => {
                error!(%job_id, detail = detail.as_str(), "generate workflow failed");
                self.jobs.fail(job_id, &detail).await?;
                Ok(DispatchOutcome::Failed { job_id, detail })
            }
        }
    }

    /// Render the job's document and publish the PNG. Every failure mode
    /// here is absorbed into the job's failure detail.
    async fn render_and_publish(&self, job: &Job) -> Result<String, String> {
        let document = LayoutDocument::from_json(job.document.clone())
            .map_err(|e| format!("stored document rejected: {e}"))?;

        let rendered = self
            .engine
            .render(&document)
            .await
            .map_err(|e| format!("render failed: {e}"))?;

        if !rendered.diagnostics.is_empty() {
            let summary = rendered
                .diagnostics
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(format!(
                "render completed with {} element error(s): {summary}",
                rendered.diagnostics.len()
            ));
        }

        let png = raster::encode_png(&rendered.image).map_err(|e| format!("encode failed: {e}"))?;
        let key = output_object_key(&job.subject_id, &job.outfeed_id, &job.id);
        self.output
            .put(&key, &png, "image/png")
            .await
            .map_err(|e| format!("publish failed: {e}"))?;
        Ok(key)
    }
}
