use log::debug;

use crate::{error::Result, options::ExecutionPath};

/// Run an operation on the given path.
///
/// `Software` and `Hardware` make a single attempt. `Auto` tries `hardware` first and, on any
/// error, discards it and runs `software` on the same state.
pub(crate) fn dispatch<S, T>(
    path: ExecutionPath,
    state: &mut S,
    hardware: impl FnOnce(&mut S) -> Result<T>,
    software: impl FnOnce(&mut S) -> Result<T>,
) -> Result<T> {
    match path {
        ExecutionPath::Software => software(state),
        ExecutionPath::Hardware => hardware(state),
        ExecutionPath::Auto => match hardware(state) {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!("hardware attempt failed ({err}), retrying on software");
                software(state)
            }
        },
    }
}
