use std::{net::TcpListener, sync::Arc};

use axum::{
  extract::{rejection::JsonRejection, OriginalUri, State},
  handler::HandlerWithoutStateExt,
  http::StatusCode,
  response::IntoResponse,
  routing::{get, post},
  Json, Router,
};
use serde::Deserialize;
use tokio_graceful_shutdown::SubsystemHandle;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use url::Url;

use crate::{
  config::Config,
  fetcher::{DirectFetcher, Fetcher, YtdlpExtractor},
  job::{FetchJob, Strategy},
  locator,
  publish::{PublishedLink, Publisher, DOWNLOADS_PREFIX},
  storage::StorageArea,
  util::redact_credentials,
  Error, Result,
};

const USER_AGENT: &str =
  concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub struct AppState {
  pub storage: StorageArea,
  pub publisher: Publisher,
  pub direct: Arc<dyn Fetcher>,
  pub extractor: Arc<dyn Fetcher>,
  pub video_only: bool,
}

impl AppState {
  pub fn new(config: &Config, storage: StorageArea) -> reqwest::Result<Self> {
    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let direct =
      DirectFetcher::new(client, storage.clone(), config.fetch_timeout());
    let extractor = YtdlpExtractor::new(config, storage.clone());

    match extractor.resolve_binary() {
      Some(path) => info!("video extractor: {}", path.display()),
      None => warn!("no video extractor found, video downloads will fail"),
    }

    Ok(Self {
      storage,
      publisher: Publisher::new(&config.public_base_url),
      direct: Arc::new(direct),
      extractor: Arc::new(extractor),
      video_only: config.video_only,
    })
  }

  /// Validate the body and pick a strategy. Nothing is fetched here.
  pub fn accept(&self, req: DownloadReq) -> Result<FetchRequest> {
    let locator = locator::parse(req.locator.as_deref().unwrap_or_default())?;
    let video = locator::is_video_url(&locator);

    let strategy = match req.strategy {
      StrategyHint::Extract => Strategy::DelegatedExtraction,
      StrategyHint::Direct => Strategy::DirectCopy,
      StrategyHint::Auto if video => Strategy::DelegatedExtraction,
      StrategyHint::Auto => Strategy::DirectCopy,
    };

    match strategy {
      Strategy::DelegatedExtraction if !video => Err(Error::InvalidLocator(
        format!("{} is not a supported video URL", redacted(&locator)),
      )),
      Strategy::DirectCopy if self.video_only => Err(Error::InvalidLocator(
        "only video URLs are accepted".into(),
      )),
      _ => Ok(FetchRequest { locator, strategy }),
    }
  }

  fn fetcher(&self, strategy: Strategy) -> &dyn Fetcher {
    match strategy {
      Strategy::DirectCopy => self.direct.as_ref(),
      Strategy::DelegatedExtraction => self.extractor.as_ref(),
    }
  }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyHint {
  #[default]
  Auto,
  Direct,
  Extract,
}

#[derive(Deserialize, Debug)]
pub struct DownloadReq {
  #[serde(alias = "url")]
  locator: Option<String>,
  #[serde(default)]
  strategy: StrategyHint,
}

#[derive(Debug)]
pub struct FetchRequest {
  pub locator: Url,
  pub strategy: Strategy,
}

pub fn router(state: Arc<AppState>) -> Router {
  let downloads = ServeDir::new(state.storage.root())
    .not_found_service(not_found.into_service());

  Router::new()
    .route("/download", post(download))
    .route("/health", get(health))
    .nest_service(DOWNLOADS_PREFIX, downloads)
    .fallback(not_found)
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

pub async fn serve(
  subsys: SubsystemHandle,
  listener: TcpListener,
  app: Router,
) -> anyhow::Result<()> {
  axum::Server::from_tcp(listener)?
    .serve(app.into_make_service())
    .with_graceful_shutdown(subsys.on_shutdown_requested())
    .await?;

  info!("server stopped");
  Ok(())
}

pub async fn download(
  State(state): State<Arc<AppState>>,
  body: std::result::Result<Json<DownloadReq>, JsonRejection>,
) -> Result<Json<PublishedLink>> {
  let req = body
    .map_err(|rejection| Error::InvalidLocator(rejection.body_text()))
    .and_then(|Json(req)| state.accept(req))
    .map_err(|e| {
      warn!("rejected request: {}", e);
      e
    })?;

  let mut job = FetchJob::new(req.strategy);
  job.start();

  match state.fetcher(req.strategy).fetch(&req.locator, &job.id).await {
    Ok(artifact) => {
      job.succeed(artifact.path.clone());
      let link = state.publisher.publish(&artifact);
      info!(
        job = %job.id,
        path = ?job.output_path(),
        "published {}", link.url
      );
      Ok(Json(link))
    }
    Err(e) => {
      job.fail(&e);
      error!(
        job = %job.id,
        status = ?job.status(),
        kind = ?job.error(),
        "{} failed: {}", redacted(&req.locator), e
      );
      Err(e)
    }
  }
}

fn redacted(locator: &Url) -> String {
  redact_credentials(locator.as_str())
}

async fn health() -> impl IntoResponse {
  "ok".to_owned()
}

async fn not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
  (StatusCode::NOT_FOUND, format!("Nothing found at {}", uri.path()))
}
