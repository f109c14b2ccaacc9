//! HTTP adapter over [`crate::contract`] (§6 "Endpoint shape"): a single
//! `POST /schedule` route built on `rouille`. The core scheduling logic
//! never depends on this module; it's a thin, optional wrapper the CLI
//! binary can switch into with `--serve`.

use crate::contract::{ScheduleRequest, ScheduleResponse};
use crate::error::SchedulingError;
use serde::Serialize;
use std::sync::atomic::AtomicBool;

/// Body of a non-2xx response: `{ "detail": "<reason>" }` per §6.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Serve `POST /schedule` at `addr` (e.g. `"0.0.0.0:8080"`) until the
/// process is killed. Blocks the calling thread, matching `rouille::start_server`.
///
/// Each request gets its own uncancellable [`AtomicBool`] — there is no
/// mechanism over plain HTTP to cancel a request already in flight, so the
/// cancellation flag here only ever demonstrates the wiring an embedder
/// with a real cancellation channel would use.
pub fn serve(addr: &str) -> ! {
    tracing::info!(addr, "starting HTTP scheduler server");
    rouille::start_server(addr, move |request| {
        rouille::router!(request,
            (POST) (/schedule) => {
                handle_schedule(request)
            },
            _ => rouille::Response::empty_404(),
        )
    })
}

fn handle_schedule(request: &rouille::Request) -> rouille::Response {
    let body: ScheduleRequest = match rouille::input::json_input(request) {
        Ok(body) => body,
        Err(e) => {
            return json_error(400, format!("malformed request body: {e}"));
        }
    };

    let cancel = AtomicBool::new(false);
    match crate::contract::schedule_cancellable(body, &cancel) {
        Ok(response) => json_ok(&response),
        Err(e) => json_error(status_for(&e), e.to_string()),
    }
}

fn status_for(e: &SchedulingError) -> u16 {
    match e {
        SchedulingError::Validation(_) | SchedulingError::Infeasible(_) => 400,
        SchedulingError::Internal(_) => 500,
    }
}

fn json_ok(body: &ScheduleResponse) -> rouille::Response {
    rouille::Response::json(body)
}

fn json_error(status: u16, detail: String) -> rouille::Response {
    rouille::Response::json(&ErrorBody { detail }).with_status_code(status)
}
