use crate::db;
use crate::error::ScoreError;
use crate::scorer::Scorer;
use bytes::Buf;
use futures::StreamExt;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

pub struct AppState {
    pub scorer: Scorer,
    pub db: Mutex<Connection>,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Fail)]
enum ApiError {
    #[fail(display = "{}", _0)]
    BadRequest(String),
    #[fail(display = "{}", _0)]
    NotFound(&'static str),
    #[fail(display = "database error: {}", _0)]
    Database(#[cause] rusqlite::Error),
    #[fail(display = "error reading upload: {}", _0)]
    Upload(#[cause] warp::Error),
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        ApiError::Database(e)
    }
}

impl From<warp::Error> for ApiError {
    fn from(e: warp::Error) -> Self {
        ApiError::Upload(e)
    }
}

impl From<ScoreError> for ApiError {
    fn from(e: ScoreError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Upload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn respond(result: Result<Response, ApiError>) -> Result<Response, Rejection> {
    Ok(match result {
        Ok(response) => response,
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                error!("Error handling request: {:?}", e);
            } else {
                debug!("Rejecting request: {}", e);
            }
            let body = warp::reply::json(&json!({ "detail": e.to_string() }));
            warp::reply::with_status(body, status).into_response()
        }
    })
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    // Leave room for multipart framing around the image itself.
    let form_limit = state.max_upload_bytes + 64 * 1024;
    let with_state = warp::any().map(move || Arc::clone(&state));

    let create = warp::post()
        .and(warp::path!("posts"))
        .and(warp::filters::multipart::form().max_length(form_limit))
        .and(with_state.clone())
        .and_then(create_post)
        .recover(upload_too_large);
    let recent = warp::get()
        .and(warp::path!("posts" / "recent_id"))
        .and(with_state.clone())
        .and_then(recent_post_id);
    let info = warp::get()
        .and(warp::path!("posts" / "info" / i64))
        .and(with_state.clone())
        .and_then(post_info);
    let by_plate = warp::get()
        .and(warp::path!("posts" / "plate" / String))
        .and(with_state.clone())
        .and_then(posts_for_plate);
    let image = warp::get()
        .and(warp::path!("posts" / i64))
        .and(with_state)
        .and_then(post_image);

    create.or(recent).or(info).or(by_plate).or(image)
}

pub async fn run(state: Arc<AppState>, port: u16) {
    info!("Listening on port {}", port);
    warp::serve(routes(state)).run(([0, 0, 0, 0], port)).await;
}

async fn create_post(
    form: warp::filters::multipart::FormData,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    respond(try_create_post(form, state).await)
}

async fn upload_too_large(rejection: Rejection) -> Result<Response, Rejection> {
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        respond(Err(ApiError::BadRequest("File is too large".to_string())))
    } else {
        Err(rejection)
    }
}

async fn try_create_post(
    mut form: warp::filters::multipart::FormData,
    state: Arc<AppState>,
) -> Result<Response, ApiError> {
    let mut upload: Option<Vec<u8>> = None;

    while let Some(part) = form.next().await {
        let part = part?;
        debug!("Got part {}", part.name());
        match part.name() {
            "upload" => {
                let is_image = part
                    .content_type()
                    .map_or(false, |ct| ct.starts_with("image/"));
                if !is_image {
                    return Err(ApiError::BadRequest("File is not an image".to_string()));
                }
                let mut data: Vec<u8> = vec![];
                let mut stream = part.stream();
                while let Some(buf) = stream.next().await {
                    data.extend_from_slice(buf?.bytes());
                    if data.len() as u64 > state.max_upload_bytes {
                        return Err(ApiError::BadRequest("File is too large".to_string()));
                    }
                }
                upload = Some(data);
            }
            _ => {
                warn!("Ignoring part {}", part.name());
            }
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("Missing upload".to_string()))?;
    let (snapshot, result) = state.scorer.score_upload(upload).await?;
    let image = result
        .annotated_image
        .as_deref()
        .unwrap_or(&snapshot.encoded);

    let id = {
        let conn = state.db.lock().await;
        db::insert_post(&conn, image, &result)?
    };
    info!(
        "Stored post {} (score {:.2}, plate {:?}, lines at {} and {})",
        id,
        result.score_value(),
        result.plate_text,
        result.bounds.x_left(),
        result.bounds.x_right()
    );

    Ok(warp::reply::json(&json!({
        "id": id,
        "plate_number": result.plate_text,
        "score": result.score_value(),
        "vehicle_found": result.vehicle_found(),
    }))
    .into_response())
}

async fn post_image(id: i64, state: Arc<AppState>) -> Result<Response, Rejection> {
    respond(try_post_image(id, state).await)
}

async fn try_post_image(id: i64, state: Arc<AppState>) -> Result<Response, ApiError> {
    let conn = state.db.lock().await;
    let image = db::post_image(&conn, id)?.ok_or(ApiError::NotFound("Post not found"))?;
    Ok(warp::reply::with_header(image, "content-type", "image/jpeg").into_response())
}

async fn post_info(id: i64, state: Arc<AppState>) -> Result<Response, Rejection> {
    respond(try_post_info(id, state).await)
}

async fn try_post_info(id: i64, state: Arc<AppState>) -> Result<Response, ApiError> {
    let conn = state.db.lock().await;
    let info = db::post_info(&conn, id)?.ok_or(ApiError::NotFound("Post not found"))?;
    Ok(warp::reply::json(&info).into_response())
}

async fn recent_post_id(state: Arc<AppState>) -> Result<Response, Rejection> {
    respond(try_recent_post_id(state).await)
}

async fn try_recent_post_id(state: Arc<AppState>) -> Result<Response, ApiError> {
    let conn = state.db.lock().await;
    let id = db::recent_post_id(&conn)?.ok_or(ApiError::NotFound("No posts found"))?;
    Ok(warp::reply::json(&json!({ "id": id })).into_response())
}

async fn posts_for_plate(plate: String, state: Arc<AppState>) -> Result<Response, Rejection> {
    respond(try_posts_for_plate(plate, state).await)
}

async fn try_posts_for_plate(
    plate: String,
    state: Arc<AppState>,
) -> Result<Response, ApiError> {
    let conn = state.db.lock().await;
    let ids = db::post_ids_for_plate(&conn, &plate.to_ascii_uppercase())?;
    if ids.is_empty() {
        return Err(ApiError::NotFound("No posts found for the plate"));
    }
    let posts: Vec<_> = ids.into_iter().map(|id| json!({ "id": id })).collect();
    Ok(warp::reply::json(&posts).into_response())
}
