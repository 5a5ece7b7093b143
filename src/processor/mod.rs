//! Fetch-render-send processing for one record.
//!
//! Each executor gets its own [`RecProcessor`] from [`RecProcessorFactory`]:
//! a dedicated HTTP client and a dedicated SMTP session, plus the shared
//! read-only [`Renderer`].

mod fetch;
mod render;
mod transport;


pub use fetch::{PayloadClient, fill_missing_thumbnails};
pub use render::{Renderer, message_dates};
pub use transport::{MailTransport, SmtpMailTransport};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use crate::config::Config;
use crate::error::{ProcessError, Result};
use crate::pipeline::{Pipeline, PipelineOptions, ProcessorFactory, UnitProcessor};
use crate::types::{EmailData, OutcomeKind, Record};

/// Per-message settings taken from the config
#[derive(Clone, Debug)]
pub struct MessageSettings {
    /// SMTP envelope sender
    pub envelope_sender: String,
    /// Address rendered as `FromAddress`
    pub header_from: String,
    /// Rendered as `Subject`
    pub subject: String,
}

impl From<&Config> for MessageSettings {
    fn from(config: &Config) -> Self {
        Self {
            envelope_sender: config.smtp_from.clone(),
            header_from: config.header_from().to_string(),
            subject: config.subject.clone(),
        }
    }
}

/// Processes records for one executor
pub struct RecProcessor {
    payload: PayloadClient,
    renderer: Arc<Renderer>,
    transport: Box<dyn MailTransport>,
    settings: MessageSettings,
}

impl RecProcessor {
    /// Assemble a processor from its parts
    pub fn new(
        payload: PayloadClient,
        renderer: Arc<Renderer>,
        transport: Box<dyn MailTransport>,
        settings: MessageSettings,
    ) -> Self {
        Self {
            payload,
            renderer,
            transport,
            settings,
        }
    }

    /// Fetch the payload, render the message and submit it
    pub async fn deliver(&self, record: &Record) -> std::result::Result<(), ProcessError> {
        let payload = self.payload.fetch(&record.subject_id).await?;
        let (date, human_date) = message_dates(&Local::now());

        let data = EmailData {
            from_address: self.settings.header_from.clone(),
            to_address: record.destination.clone(),
            subject: self.settings.subject.clone(),
            date,
            human_date,
            rec_response: payload,
        };
        let message = self.renderer.render(&data)?;

        self.transport
            .send(
                &self.settings.envelope_sender,
                &record.destination,
                message.as_bytes(),
            )
            .await
    }
}

#[async_trait]
impl UnitProcessor for RecProcessor {
    async fn process(&mut self, record: &Record) -> OutcomeKind {
        match self.deliver(record).await {
            Ok(()) => OutcomeKind::Success,
            Err(e) => {
                tracing::warn!(
                    subject_id = %record.subject_id,
                    destination = %record.destination,
                    step = e.step(),
                    error = %e,
                    "Record failed"
                );
                OutcomeKind::Failure
            }
        }
    }
}

/// Builds a [`RecProcessor`] with its own HTTP client and SMTP session
pub struct RecProcessorFactory {
    config: Arc<Config>,
    renderer: Arc<Renderer>,
}

impl RecProcessorFactory {
    /// Create a factory sharing `renderer` across executors
    pub fn new(config: Arc<Config>, renderer: Arc<Renderer>) -> Self {
        Self { config, renderer }
    }

    /// Pipeline sized from the config and driven by this factory
    pub fn into_pipeline(self) -> Pipeline {
        let options = PipelineOptions::from(&self.config.pipeline);
        Pipeline::new(options, Arc::new(self))
    }
}

#[async_trait]
impl ProcessorFactory for RecProcessorFactory {
    async fn create(&self, executor_id: usize) -> Result<Box<dyn UnitProcessor>> {
        let payload = PayloadClient::from_config(&self.config)?;
        let transport = SmtpMailTransport::connect(&self.config).await?;
        tracing::debug!(executor_id, "SMTP session established");

        Ok(Box::new(RecProcessor::new(
            payload,
            Arc::clone(&self.renderer),
            Box::new(transport),
            MessageSettings::from(self.config.as_ref()),
        )))
    }
}
