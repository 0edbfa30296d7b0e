//! Code-region location
//!
//! Finds the usable JIT-compiled hot region for a method record, working
//! around duplicate method records in the snapshot.

use crate::runtime::{CodeRegion, ManagedRuntime, MethodRecord};

/// Find the non-empty hot region for `method`, or `None` if no compiled
/// copy exists.
///
/// A snapshot can list the same logical method twice on one type - an
/// uncompiled placeholder and the actual compiled instance - sharing token
/// and signature but differing in region validity. Enumeration order does
/// not reflect compiled status, so when the given record's own region is
/// empty, every record on the declaring type is scanned for one with the
/// same identity and a usable region.
///
/// `None` is an expected outcome, not an error; callers render a
/// placeholder line and move on.
pub fn find_compiled_region(
    runtime: &dyn ManagedRuntime,
    method: &MethodRecord,
) -> Option<CodeRegion> {
    if method.hot_cold.is_usable() {
        return Some(method.hot_cold);
    }

    let declaring_type = method.declaring_type?;
    let identity = method.identity();

    runtime
        .methods_of_type(declaring_type)
        .into_iter()
        .find(|other| other.hot_cold.is_usable() && other.identity() == identity)
        .map(|other| other.hot_cold)
}
