use crate::{error::GvxError, io::gvcf_writer::GvcfWriter, utils::util::Result};
use std::{any::Any, thread};

fn panic_payload_message(panic_payload: &(dyn Any + Send + 'static)) -> String {
    if let Some(message) = panic_payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = panic_payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_owned()
}

fn join_thread_result<T>(thread_name: &str, handle: thread::JoinHandle<Result<T>>) -> Result<T> {
    match handle.join() {
        Ok(result) => result.map_err(|e| crate::gvx_error!("{thread_name} thread failed: {e}")),
        Err(panic_payload) => Err(crate::gvx_error!(
            "{thread_name} thread panicked: {}",
            panic_payload_message(panic_payload.as_ref())
        )),
    }
}

fn aggregate_shutdown_errors<T>(value: Option<T>, errors: Vec<GvxError>) -> Result<T> {
    if errors.is_empty() {
        if let Some(value) = value {
            return Ok(value);
        }
        return Err(crate::gvx_error!(
            "Writer thread finished without yielding its output handle"
        ));
    }
    if errors.len() == 1 {
        return Err(errors.into_iter().next().expect("single error expected"));
    }
    let summary = errors
        .into_iter()
        .enumerate()
        .map(|(index, error)| format!("{}. {}", index + 1, error))
        .collect::<Vec<_>>()
        .join("; ");
    Err(crate::gvx_error!(
        "Multiple thread shutdown errors: {summary}"
    ))
}

/// Joins the reader and writer threads, collecting every failure rather
/// than stopping at the first. Returns the writer's output handle so the
/// caller can persist it only after a fully clean shutdown.
pub(crate) fn finalize_merge_threads(
    reader_thread: thread::JoinHandle<Result<()>>,
    writer_thread: thread::JoinHandle<Result<GvcfWriter>>,
) -> Result<GvcfWriter> {
    let mut errors = Vec::new();

    match join_thread_result("Reader", reader_thread) {
        Ok(()) => log::debug!("Reader thread joined successfully."),
        Err(error) => errors.push(error),
    }
    let writer = match join_thread_result("Writer", writer_thread) {
        Ok(writer) => {
            log::debug!("Writer thread joined successfully.");
            Some(writer)
        }
        Err(error) => {
            errors.push(error);
            None
        }
    };

    aggregate_shutdown_errors(writer, errors)
}
