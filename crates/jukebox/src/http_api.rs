//! HTTP API for the configuration web UI.
//!
//! A thin layer over [`ConfigGateway`] and the music folder. Runs on its own actix system
//! thread so the control loop stays synchronous.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, post, web};
use anyhow::{Context, Result, anyhow};
use jukebox_types::{
    AddMappingRequest, DeleteFileRequest, MutationResponse, RemoveMappingRequest,
    RenameFileRequest, ResultCode, TagIdResponse,
};

use crate::error::MappingError;
use crate::gateway::ConfigGateway;
use crate::library::{self, LibraryError};
use crate::status::StatusSources;

pub(crate) struct ApiState {
    pub(crate) gateway: Arc<ConfigGateway>,
    pub(crate) status: StatusSources,
    pub(crate) music_dir: PathBuf,
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "build": env!("GIT_SHA"),
    }))
}

#[get("/status")]
async fn status(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.status.snapshot())
}

#[get("/mappings")]
async fn list_mappings(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.gateway.list())
}

#[post("/addmapping")]
async fn add_mapping(
    state: web::Data<ApiState>,
    body: web::Json<AddMappingRequest>,
) -> impl Responder {
    match state.gateway.upsert(&body.tagid, &body.song) {
        Ok(out) => HttpResponse::Ok().json(MutationResponse {
            warning: out.persist_warning,
            mappings: Some(out.mappings),
            ..MutationResponse::ok()
        }),
        Err(e) => mapping_error_response(&e),
    }
}

#[post("/delmapping")]
async fn remove_mapping(
    state: web::Data<ApiState>,
    body: web::Json<RemoveMappingRequest>,
) -> impl Responder {
    let out = state.gateway.remove(&body.tagid);
    if !out.value {
        return HttpResponse::NotFound().json(MutationResponse::failed(
            ResultCode::NotFound,
            format!("no mapping for tag {}", body.tagid.trim()),
        ));
    }
    HttpResponse::Ok().json(MutationResponse {
        warning: out.persist_warning,
        mappings: Some(out.mappings),
        ..MutationResponse::ok()
    })
}

/// Tag currently on the reader ("Scan Tag" in the UI).
#[get("/tagid")]
async fn current_tag(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(TagIdResponse {
        tagid: state.status.presence.current(),
    })
}

#[get("/songs")]
async fn list_songs(state: web::Data<ApiState>) -> impl Responder {
    match library::list_songs(&state.music_dir) {
        Ok(songs) => HttpResponse::Ok().json(songs),
        Err(e) => {
            tracing::warn!(error = %e, "song listing failed");
            HttpResponse::InternalServerError()
                .json(MutationResponse::failed(ResultCode::Error, e.to_string()))
        }
    }
}

// File operations answer 200 with a result code; the UI inspects `result`.
#[post("/renamefile")]
async fn rename_file(
    state: web::Data<ApiState>,
    body: web::Json<RenameFileRequest>,
) -> impl Responder {
    match library::rename_song(&state.music_dir, &state.gateway, &body.oldname, &body.newname) {
        Ok(renamed) => HttpResponse::Ok().json(MutationResponse {
            warning: renamed.persist_warning,
            mappings_updated: Some(renamed.mappings_updated),
            ..MutationResponse::ok()
        }),
        Err(e) => HttpResponse::Ok().json(library_failure(&e)),
    }
}

#[post("/deletefile")]
async fn delete_file(
    state: web::Data<ApiState>,
    body: web::Json<DeleteFileRequest>,
) -> impl Responder {
    match library::delete_song(&state.music_dir, &state.gateway, &body.filename) {
        Ok(()) => HttpResponse::Ok().json(MutationResponse::ok()),
        Err(e) => HttpResponse::Ok().json(library_failure(&e)),
    }
}

fn mapping_error_response(err: &MappingError) -> HttpResponse {
    let (http_status, code) = match err {
        MappingError::SlotsExhausted { .. } => (StatusCode::CONFLICT, ResultCode::Full),
        MappingError::InvalidTagId(_) | MappingError::InvalidTrackPath(_) => {
            (StatusCode::BAD_REQUEST, ResultCode::Invalid)
        }
    };
    HttpResponse::build(http_status).json(MutationResponse::failed(code, err.to_string()))
}

fn library_failure(err: &LibraryError) -> MutationResponse {
    let code = match err {
        LibraryError::InvalidName(_) | LibraryError::Mapping(_) => ResultCode::Invalid,
        LibraryError::NotFound(_) => ResultCode::NotFound,
        LibraryError::Exists(_) => ResultCode::Exists,
        LibraryError::InUse(_) => ResultCode::InUse,
        LibraryError::Io { .. } => {
            tracing::warn!(error = %err, "file operation failed");
            ResultCode::Error
        }
    };
    MutationResponse::failed(code, err.to_string())
}

fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(status)
        .service(list_mappings)
        .service(add_mapping)
        .service(remove_mapping)
        .service(current_tag)
        .service(list_songs)
        .service(rename_file)
        .service(delete_file);
}

/// Running HTTP server thread.
pub(crate) struct HttpServerHandle {
    server: actix_web::dev::ServerHandle,
    join: thread::JoinHandle<std::io::Result<()>>,
}

impl HttpServerHandle {
    /// Stop accepting connections, finish in-flight requests and join the thread.
    pub(crate) fn stop(self) {
        actix_web::rt::System::new().block_on(self.server.stop(true));
        match self.join.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "http server exited with error"),
            Err(_) => tracing::warn!("http server thread panicked"),
        }
    }
}

/// Bind `bind` and serve on a dedicated thread. Fails if the address cannot be bound.
pub(crate) fn spawn_http_server(bind: SocketAddr, state: ApiState) -> Result<HttpServerHandle> {
    let state = web::Data::new(state);
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
    let join = thread::Builder::new()
        .name("http".to_string())
        .spawn(move || {
            actix_web::rt::System::new().block_on(async move {
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(state.clone())
                        .wrap(Logger::default().exclude("/status").exclude("/health"))
                        .configure(configure)
                })
                .workers(1)
                .bind(bind);
                let server = match server {
                    Ok(server) => server.run(),
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok(server.handle()));
                server.await
            })
        })
        .context("spawn http thread")?;

    let server = ready_rx
        .recv()
        .map_err(|_| anyhow!("http thread exited before binding"))?
        .with_context(|| format!("bind http {bind}"))?;
    tracing::info!(bind = %bind, "http api listening");
    Ok(HttpServerHandle { server, join })
}
