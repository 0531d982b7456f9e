//! Test app builder that mirrors main.rs wiring with injectable mocks.
//!
//! [`TestAppBuilder`] constructs the same router as production through
//! [`emailcongress_api::app::router`], but every repository and outbound
//! client is a mock the test can script and inspect.
//!
//! # Usage
//!
//! ```ignore
//! use crate::common::app_builder::TestAppBuilder;
//!
//! #[tokio::test]
//! async fn test_with_full_app() {
//!     let app = TestAppBuilder::with_mocks().build();
//!     app.legislators.insert(LegislatorFactory::senator("VA").build());
//!
//!     // Use app.router.clone().oneshot(...) to send requests
//! }
//! ```

use std::sync::Arc;

use axum::Router;
use emailcongress_api::{
    app,
    config::{DeliveryConfig, RateLimitConfig},
    congress::{
        mock::{MockCongressClient, MockLegislatorRepo},
        DistrictResolver, EmailRouting,
    },
    constituents::{mock::MockConstituentRepo, ConstituentService},
    formfill::mock::MockFormFillClient,
    geocode::mock::MockGeocoder,
    messages::{
        mock::{MockMessageRepo, RecordingNotifier},
        ChannelDeliveryQueue, DeliveryOrchestrator, DeliveryWorker, InboundPipeline,
    },
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A built application plus handles on every mock behind it.
pub struct TestApp {
    pub router: Router,
    pub messages: Arc<MockMessageRepo>,
    pub constituents: Arc<MockConstituentRepo>,
    pub legislators: Arc<MockLegislatorRepo>,
    pub congress: Arc<MockCongressClient>,
    pub geocoder: Arc<MockGeocoder>,
    pub form_fill: Arc<MockFormFillClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<ConstituentService>,
    pub pipeline: Arc<InboundPipeline>,
    pub orchestrator: Arc<DeliveryOrchestrator>,
    pub worker: Arc<DeliveryWorker>,
    /// Message ids the pipeline enqueued; nothing consumes them unless the
    /// test hands this to [`DeliveryWorker::run`].
    pub queued: UnboundedReceiver<Uuid>,
}

impl TestApp {
    /// Hand the pipeline's queue to the delivery worker, as main.rs does.
    ///
    /// `queued` is left holding a closed receiver afterwards.
    pub fn start_worker(&mut self) -> JoinHandle<()> {
        let (_closed_tx, closed_rx) = mpsc::unbounded_channel();
        let rx = std::mem::replace(&mut self.queued, closed_rx);
        tokio::spawn(Arc::clone(&self.worker).run(rx))
    }
}

/// Builder for test applications that mirrors main.rs wiring.
pub struct TestAppBuilder {
    include_swagger: bool,
    rate_limit: RateLimitConfig,
    delivery: DeliveryConfig,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::with_mocks()
    }
}

impl TestAppBuilder {
    /// Mock-backed app with production rate limits and a fast retry loop.
    #[must_use]
    pub fn with_mocks() -> Self {
        Self {
            include_swagger: false,
            rate_limit: RateLimitConfig::default(),
            delivery: DeliveryConfig {
                max_attempts: 3,
                retry_delay_ms: 5,
                ..DeliveryConfig::default()
            },
        }
    }

    #[must_use]
    pub const fn with_swagger(mut self) -> Self {
        self.include_swagger = true;
        self
    }

    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub const fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    #[must_use]
    pub fn build(self) -> TestApp {
        let messages = Arc::new(MockMessageRepo::new());
        let constituents = Arc::new(MockConstituentRepo::new());
        let legislators = Arc::new(MockLegislatorRepo::new());
        let congress = Arc::new(MockCongressClient::new());
        let geocoder = Arc::new(MockGeocoder::new());
        let form_fill = Arc::new(MockFormFillClient::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let resolver = Arc::new(DistrictResolver::new(congress.clone(), geocoder.clone()));
        let service = Arc::new(ConstituentService::new(
            constituents.clone(),
            resolver,
            geocoder.clone(),
        ));

        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            messages.clone(),
            constituents.clone(),
            form_fill.clone(),
            notifier.clone(),
            self.delivery,
        ));
        let worker = Arc::new(DeliveryWorker::new(
            orchestrator.clone(),
            messages.clone(),
            self.delivery,
        ));

        let (queue, queued) = ChannelDeliveryQueue::channel();
        let pipeline = Arc::new(InboundPipeline::new(
            messages.clone(),
            constituents.clone(),
            legislators.clone(),
            Arc::new(queue),
            notifier.clone(),
            self.rate_limit,
            EmailRouting::new("myreps@emailcongress.us", "emailcongress.us", "opencongress.org"),
        ));

        let router = app::router(
            pipeline.clone(),
            service.clone(),
            messages.clone(),
            self.include_swagger,
        );

        TestApp {
            router,
            messages,
            constituents,
            legislators,
            congress,
            geocoder,
            form_fill,
            notifier,
            service,
            pipeline,
            orchestrator,
            worker,
            queued,
        }
    }
}
