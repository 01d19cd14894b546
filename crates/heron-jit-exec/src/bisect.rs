//! Allow-list bisection.
//!
//! Narrows a list of compiled functions down to a minimal subset that still
//! reproduces a failure when it is the only thing the JIT may compile.

/// Errors from [`bisect`].
#[derive(Debug, thiserror::Error)]
pub enum BisectError {
    /// Nothing to bisect.
    #[error("no candidate functions to bisect")]
    NoCandidates,

    /// The failure does not reproduce with every candidate enabled.
    #[error("command succeeded with the full jit-list")]
    SucceedsWithFullList,

    /// The failure reproduces even with the JIT compiling nothing.
    #[error("command failed with an empty jit-list")]
    FailsWithEmptyList,

    /// A trial run could not be carried out.
    #[error("trial run failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Find a minimal set of candidates for which `passes` returns `false`.
///
/// `passes(list)` runs the program with `list` as the allow-list and reports
/// whether it succeeded. Candidates are sorted and deduplicated first. The
/// result is sorted.
pub fn bisect<F>(
    candidates: impl IntoIterator<Item = String>,
    mut passes: F,
) -> Result<Vec<String>, BisectError>
where
    F: FnMut(&[String]) -> std::io::Result<bool>,
{
    let mut candidates: Vec<String> = candidates.into_iter().collect();
    candidates.sort();
    candidates.dedup();
    if candidates.is_empty() {
        return Err(BisectError::NoCandidates);
    }

    tracing::info!(target: "heron::bisect", count = candidates.len(), "verifying jit-list");
    if passes(&candidates)? {
        return Err(BisectError::SucceedsWithFullList);
    }
    if !passes(&[])? {
        return Err(BisectError::FailsWithEmptyList);
    }

    let mut result = reduce(&mut passes, &[], candidates, 0)?;
    result.sort();
    tracing::info!(target: "heron::bisect", count = result.len(), "bisection finished");
    Ok(result)
}

/// Shrink `list` while `fixed + list` keeps failing.
fn reduce<F>(
    passes: &mut F,
    fixed: &[String],
    mut list: Vec<String>,
    depth: usize,
) -> std::io::Result<Vec<String>>
where
    F: FnMut(&[String]) -> std::io::Result<bool>,
{
    while list.len() > 1 {
        let right = list.split_off(list.len() / 2);
        let left = list;
        tracing::debug!(
            target: "heron::bisect",
            depth,
            fixed = fixed.len(),
            left = left.len(),
            right = right.len(),
            "splitting"
        );

        if !passes(&concat(fixed, &left))? {
            list = left;
            continue;
        }
        if !passes(&concat(fixed, &right))? {
            list = right;
            continue;
        }

        // Both halves are needed. Minimize each against the other.
        let left = reduce(passes, &concat(fixed, &right), left, depth + 1)?;
        let right = reduce(passes, &concat(fixed, &left), right, depth + 1)?;
        return Ok(concat(&left, &right));
    }
    Ok(list)
}

fn concat(a: &[String], b: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}
