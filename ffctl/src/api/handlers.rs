use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use ffctl_task::{Config, ConfigIo, Task};

use crate::api::error::ApiError;
use crate::api::types::*;
use crate::api::AppState;

const PROCESS_TYPE: &str = "ffmpeg";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub async fn add_process(
    State(state): State<AppState>,
    Json(req): Json<ProcessConfigRequest>,
) -> Result<Json<ProcessConfigResponse>, ApiError> {
    if req.input.is_empty() || req.output.is_empty() {
        return Err(ApiError::bad_request(
            "At least one input and one output required",
            "",
        ));
    }

    let task = state.store.add(config_from_request(req)).await?;
    Ok(Json(config_response(&task)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub id: String,
}

pub async fn list_processes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<ProcessResponse>> {
    let ids: Vec<String> = query
        .id
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    let tasks = state.store.list(&ids, &query.reference).await;

    let mut processes = Vec::with_capacity(tasks.len());
    for task in &tasks {
        processes.push(process_response(task, &query.filter).await);
    }
    Json(processes)
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    #[serde(default)]
    pub filter: String,
}

pub async fn get_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let task = state.store.get(&id).await?;
    Ok(Json(process_response(&task, &query.filter).await))
}

pub async fn update_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ProcessConfigRequest>,
) -> Result<Json<ProcessConfigResponse>, ApiError> {
    if req.input.is_empty() || req.output.is_empty() {
        return Err(ApiError::bad_request(
            "At least one input and one output required",
            "",
        ));
    }

    let mut config = config_from_request(req);
    config.id = id.clone();

    let task = state.store.update(&id, config).await?;
    Ok(Json(config_response(&task)))
}

pub async fn delete_process(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<&'static str>, ApiError> {
    state.store.stop(&id).await?;
    state
        .store
        .delete(&id)
        .await
        .map_err(|err| ApiError::internal("Delete failed", err.to_string()))?;
    Ok(Json("OK"))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessConfigResponse>, ApiError> {
    let task = state.store.get(&id).await?;
    Ok(Json(config_response(&task)))
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessStateResponse>, ApiError> {
    let task = state.store.get(&id).await?;
    Ok(Json(state_response(&task).await))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProcessReportResponse>, ApiError> {
    let task = state.store.get(&id).await?;
    Ok(Json(report_response(&task)))
}

pub async fn command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Result<Json<&'static str>, ApiError> {
    match req.command.as_str() {
        "start" => state.store.start(&id).await?,
        "stop" => state.store.stop(&id).await?,
        "restart" => state.store.restart(&id).await?,
        _ => {
            return Err(ApiError::bad_request(
                "Unknown command",
                "Known commands: start, stop, restart",
            ))
        }
    }
    Ok(Json("OK"))
}

pub async fn skills(State(state): State<AppState>) -> Json<ffctl_ffmpeg::Skills> {
    Json((*state.ffmpeg.skills()).clone())
}

pub async fn reload_skills(
    State(state): State<AppState>,
) -> Result<Json<ffctl_ffmpeg::Skills>, ApiError> {
    state
        .ffmpeg
        .reload_skills()
        .await
        .map_err(|err| ApiError::internal("Reload failed", err.to_string()))?;
    Ok(Json((*state.ffmpeg.skills()).clone()))
}

fn config_from_request(req: ProcessConfigRequest) -> Config {
    Config {
        id: req.id,
        reference: req.reference,
        input: req.input.into_iter().map(io_from_request).collect(),
        output: req.output.into_iter().map(io_from_request).collect(),
        options: req.options,
        reconnect: req.reconnect,
        reconnect_delay: req.reconnect_delay_seconds,
        autostart: req.autostart,
        stale_timeout: req.stale_timeout_seconds,
        limit_cpu: req.limits.cpu_usage,
        limit_memory: req.limits.memory_mbytes * 1024 * 1024,
        limit_waitfor: req.limits.waitfor_seconds,
    }
}

fn io_from_request(io: ProcessConfigIo) -> ConfigIo {
    ConfigIo {
        id: io.id,
        address: io.address,
        options: io.options,
    }
}

fn io_response(io: &ConfigIo) -> ProcessConfigIo {
    ProcessConfigIo {
        id: io.id.clone(),
        address: io.address.clone(),
        options: io.options.clone(),
    }
}

fn config_response(task: &Task) -> ProcessConfigResponse {
    let config = &task.config;
    ProcessConfigResponse {
        id: task.id.clone(),
        kind: PROCESS_TYPE.to_string(),
        reference: task.reference.clone(),
        input: config.input.iter().map(io_response).collect(),
        output: config.output.iter().map(io_response).collect(),
        options: config.options.clone(),
        reconnect: config.reconnect,
        reconnect_delay_seconds: config.reconnect_delay,
        autostart: config.autostart,
        stale_timeout_seconds: config.stale_timeout,
        limits: ProcessConfigLimits {
            cpu_usage: config.limit_cpu,
            memory_mbytes: config.limit_memory / 1024 / 1024,
            waitfor_seconds: config.limit_waitfor,
        },
    }
}

async fn state_response(task: &Task) -> ProcessStateResponse {
    let status = task.status().await;

    ProcessStateResponse {
        order: status.order.to_string(),
        state: status.state.to_string(),
        runtime_seconds: status.duration.as_secs() as i64,
        reconnect_seconds: status
            .reconnect_in
            .map(|d| d.as_secs() as i64)
            .unwrap_or(-1),
        last_logline: task
            .log()
            .last()
            .map(|line| line.data.clone())
            .unwrap_or_default(),
        progress: task.progress(),
        memory_bytes: status.memory_current,
        cpu_usage: status.cpu_current,
        command: task.command(),
    }
}

fn report_response(task: &Task) -> ProcessReportResponse {
    ProcessReportResponse {
        created_at: task.created_at,
        prelude: Vec::new(),
        log: task
            .log()
            .iter()
            .map(|line| {
                (
                    line.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    line.data.clone(),
                )
            })
            .collect(),
    }
}

async fn process_response(task: &Task, filter: &str) -> ProcessResponse {
    let include_all = filter.is_empty();

    let mut process = ProcessResponse {
        id: task.id.clone(),
        kind: PROCESS_TYPE.to_string(),
        reference: task.reference.clone(),
        created_at: task.created_at,
        updated_at: task.updated_at,
        config: None,
        state: None,
        report: None,
    };

    if include_all || filter.contains("config") {
        process.config = Some(config_response(task));
    }
    if include_all || filter.contains("state") {
        process.state = Some(state_response(task).await);
    }
    if include_all || filter.contains("report") {
        process.report = Some(report_response(task));
    }

    process
}
