use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use convo_core::problemdetails::{self, Problem};
use convo_core::ServiceResult;
use convo_services::{Failure, ServiceResponse};
use serde::Serialize;

pub type ApiResult = Result<Response, Problem>;

fn failure_problem(failure: Option<Failure>, message: Option<String>) -> Problem {
    let (status, title) = match failure {
        Some(Failure::Invalid) => (StatusCode::BAD_REQUEST, "Invalid Request"),
        Some(Failure::NotFound) => (StatusCode::NOT_FOUND, "Not Found"),
        Some(Failure::Conflict) => (StatusCode::CONFLICT, "Conflict"),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Request Failed"),
    };
    let problem = problemdetails::new(status).with_title(title);
    match message {
        Some(message) => problem.with_detail(message),
        None => problem,
    }
}

/// Render a service outcome with `status` on success, or as a problem
pub fn reply<T: Serialize>(
    status: StatusCode,
    outcome: ServiceResult<ServiceResponse<T>>,
) -> ApiResult {
    let response = outcome?;
    if !response.success {
        return Err(failure_problem(response.failure, response.message));
    }
    Ok((status, Json(response)).into_response())
}

pub fn ok<T: Serialize>(outcome: ServiceResult<ServiceResponse<T>>) -> ApiResult {
    reply(StatusCode::OK, outcome)
}

pub fn created<T: Serialize>(outcome: ServiceResult<ServiceResponse<T>>) -> ApiResult {
    reply(StatusCode::CREATED, outcome)
}
