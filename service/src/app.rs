//! Service wiring shared by the server binary and the operator CLI.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Extension, Router};
use sqlx_postgres::PgPool;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::Config;
use crate::congress::{DistrictResolver, EmailRouting, HttpCongressClient, PgLegislatorRepo};
use crate::constituents::{ConstituentService, PgConstituentRepo};
use crate::formfill::HttpFormFillClient;
use crate::geocode::HttpGeocoder;
use crate::messages::{
    notifier_from_config, ChannelDeliveryQueue, DeliveryOrchestrator, DeliveryWorker,
    InboundPipeline, MessageRepo, PgMessageRepo,
};
use crate::rest::{self, ApiDoc};

/// Everything the HTTP layer and the delivery worker need.
pub struct Services {
    pub constituents: Arc<ConstituentService>,
    pub pipeline: Arc<InboundPipeline>,
    pub messages: Arc<dyn MessageRepo>,
    pub orchestrator: Arc<DeliveryOrchestrator>,
    pub worker: Arc<DeliveryWorker>,
    pub queue: Arc<ChannelDeliveryQueue>,
}

impl Services {
    /// Build the Postgres- and HTTP-backed services.
    ///
    /// Returns the receiving end of the delivery queue for
    /// [`DeliveryWorker::run`].
    ///
    /// # Errors
    ///
    /// Returns an error if an outbound HTTP client cannot be built.
    pub fn from_config(
        config: &Config,
        pool: &PgPool,
    ) -> Result<(Self, UnboundedReceiver<Uuid>), anyhow::Error> {
        let congress = Arc::new(HttpCongressClient::from_config(&config.congress_api)?);
        let geocoder = Arc::new(HttpGeocoder::new(config.geocoder.clone())?);
        let form_fill = Arc::new(HttpFormFillClient::new(config.form_fill.clone())?);
        let notifier = notifier_from_config(&config.notifications)?;

        let constituent_repo = Arc::new(PgConstituentRepo::new(pool.clone()));
        let legislators = Arc::new(PgLegislatorRepo::new(pool.clone()));
        let messages: Arc<dyn MessageRepo> = Arc::new(PgMessageRepo::new(pool.clone()));

        let resolver = Arc::new(DistrictResolver::new(congress, geocoder.clone()));
        let constituents = Arc::new(ConstituentService::new(
            constituent_repo.clone(),
            resolver,
            geocoder,
        ));

        let orchestrator = Arc::new(
            DeliveryOrchestrator::new(
                messages.clone(),
                constituent_repo.clone(),
                form_fill,
                notifier.clone(),
                config.delivery,
            )
            .with_campaign_tag(config.form_fill.send_campaign_tag),
        );
        let worker = Arc::new(DeliveryWorker::new(
            orchestrator.clone(),
            messages.clone(),
            config.delivery,
        ));

        let (queue, rx) = ChannelDeliveryQueue::channel();
        let queue = Arc::new(queue);

        let pipeline = Arc::new(InboundPipeline::new(
            messages.clone(),
            constituent_repo,
            legislators,
            queue.clone(),
            notifier,
            config.rate_limit,
            EmailRouting::from_config(&config.email),
        ));

        Ok((
            Self {
                constituents,
                pipeline,
                messages,
                orchestrator,
                worker,
                queue,
            },
            rx,
        ))
    }
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// The HTTP application: REST under `/api/v1`, `/health`, and Swagger UI
/// when enabled.
pub fn router(
    pipeline: Arc<InboundPipeline>,
    constituents: Arc<ConstituentService>,
    messages: Arc<dyn MessageRepo>,
    swagger: bool,
) -> Router {
    let mut app = Router::new()
        .nest("/api/v1", rest::router())
        .route("/health", get(health_check));

    if swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    app.layer(Extension(pipeline))
        .layer(Extension(constituents))
        .layer(Extension(messages))
        .layer(TraceLayer::new_for_http())
}
