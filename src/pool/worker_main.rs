//! Entry point for pool child processes.
//!
//! Runs when the binary is started with `--internal-worker`. Requests arrive
//! on stdin and responses leave on stdout, so all logging goes to stderr.

use super::protocol::{WorkRequest, WorkResponse};
use crate::error::Result;
use std::io::{self, BufRead, BufWriter, Write};

/// Serve analysis requests until the parent sends exit or closes stdin.
///
/// Returns the process exit code.
pub fn run_worker_main() -> i32 {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = stdin.lock();
    let mut writer = BufWriter::new(stdout.lock());

    tracing::debug!(pid = std::process::id(), "Pool worker starting");

    match worker_loop(&mut reader, &mut writer) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Pool worker failed");
            1
        }
    }
}

fn worker_loop<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> Result<()> {
    WorkResponse::send(writer, &WorkResponse::Ready, &[])?;

    loop {
        let (analysis, frame) = match WorkRequest::recv(reader)? {
            // EOF - parent closed the pipe
            None => return Ok(()),
            Some((WorkRequest::Exit, _)) => {
                tracing::debug!("Pool worker received exit request");
                return Ok(());
            }
            Some((WorkRequest::Apply { analysis, .. }, Some(frame))) => (analysis, frame),
            Some((WorkRequest::Apply { .. }, None)) => {
                WorkResponse::send(writer, &WorkResponse::error("request without frame"), &[])?;
                continue;
            }
        };

        match analysis.apply(frame) {
            Ok(result) => WorkResponse::send_result(writer, &result)?,
            Err(e) => WorkResponse::send(writer, &WorkResponse::error(e.to_string()), &[])?,
        }
    }
}
