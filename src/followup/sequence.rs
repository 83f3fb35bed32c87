use crate::error::CoreError;

/// Pick the template for an attempt out of a per-stage ordered sequence.
///
/// Attempt indexes are zero-based. Indexes past the end clamp to the last
/// element; an empty sequence falls back to the job's own template id.
/// Every attempt must resolve to exactly one template — if even the
/// fallback is blank the operation fails and the job stays untouched for
/// the next tick.
pub fn resolve_template<'a>(
    sequence: &'a [String],
    attempt_index: usize,
    fallback: &'a str,
) -> Result<&'a str, CoreError> {
    let chosen = match sequence.len() {
        0 => fallback,
        len => sequence[attempt_index.min(len - 1)].as_str(),
    };
    if chosen.is_empty() {
        return Err(CoreError::Configuration(
            "no template resolvable for attempt".into(),
        ));
    }
    Ok(chosen)
}
