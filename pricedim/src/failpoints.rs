use fail::fail_point;

use crate::bail;
use crate::error::DimResult;

pub const APPLY_CHANGES__BEFORE_COMMIT: &str = "apply_changes.before_commit";
pub const FINISH_RUN__BEFORE_WRITE: &str = "finish_run.before_write";

pub fn dim_fail_point(name: &str) -> DimResult<()> {
    fail_point!(name, |_| {
        bail!(
            crate::error::ErrorKind::WithInjectedFault,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
