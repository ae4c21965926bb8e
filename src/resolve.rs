//! Fuzzy resolution of worker names and protocol references.
//!
//! Chat users say "Udi" or "oxygen", never ids or slugs. Matching runs in
//! tiers from exact to loose and stops at the first tier that produces
//! matches. A tier yielding more than one candidate is a failure, not a
//! guess: the caller reports the candidates and lets the user disambiguate.

use crate::catalog::Protocol;
use crate::db::Worker;

/// Why a reference failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFailure {
    /// No tier produced a match.
    NotFound { query: String },
    /// A tier produced several matches; listed for the user to pick from.
    Ambiguous { query: String, candidates: Vec<String> },
}

impl ResolveFailure {
    /// Human-readable message for a tool result.
    pub fn message(&self, kind: &str) -> String {
        match self {
            ResolveFailure::NotFound { query } => {
                format!("No {kind} found matching '{query}'")
            }
            ResolveFailure::Ambiguous { query, candidates } => format!(
                "'{query}' matches several {kind}s: {}. Please be more specific.",
                candidates.join(", ")
            ),
        }
    }
}

fn single<T: Clone>(
    query: &str,
    matches: Vec<&T>,
    label: impl Fn(&T) -> String,
) -> Option<Result<T, ResolveFailure>> {
    match matches.len() {
        0 => None,
        1 => Some(Ok(matches[0].clone())),
        _ => Some(Err(ResolveFailure::Ambiguous {
            query: query.to_string(),
            candidates: matches.iter().map(|m| label(m)).collect(),
        })),
    }
}

/// Resolve a spoken worker reference against the active roster.
///
/// Tiers: exact full name, then first-name prefix, then substring in
/// either direction. Comparison is case-insensitive throughout.
pub fn resolve_worker(query: &str, workers: &[Worker]) -> Result<Worker, ResolveFailure> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return Err(ResolveFailure::NotFound {
            query: query.trim().to_string(),
        });
    }
    let label = |w: &Worker| w.name.clone();

    let exact: Vec<&Worker> = workers
        .iter()
        .filter(|w| w.name.to_lowercase() == q)
        .collect();
    if let Some(outcome) = single(query, exact, label) {
        return outcome;
    }

    let first_name: Vec<&Worker> = workers
        .iter()
        .filter(|w| {
            w.name
                .split_whitespace()
                .next()
                .is_some_and(|first| first.to_lowercase().starts_with(&q))
        })
        .collect();
    if let Some(outcome) = single(query, first_name, label) {
        return outcome;
    }

    let substring: Vec<&Worker> = workers
        .iter()
        .filter(|w| {
            let name = w.name.to_lowercase();
            name.contains(&q) || q.contains(&name)
        })
        .collect();
    if let Some(outcome) = single(query, substring, label) {
        return outcome;
    }

    Err(ResolveFailure::NotFound {
        query: query.trim().to_string(),
    })
}

/// Resolve a spoken protocol reference against the catalog.
///
/// Tiers: exact slug, exact title, title substring in either direction,
/// slug substring.
pub fn resolve_protocol(query: &str, protocols: &[Protocol]) -> Result<Protocol, ResolveFailure> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return Err(ResolveFailure::NotFound {
            query: query.trim().to_string(),
        });
    }
    let label = |p: &Protocol| format!("{} ({})", p.title, p.slug);

    let exact_slug: Vec<&Protocol> = protocols
        .iter()
        .filter(|p| p.slug.to_lowercase() == q)
        .collect();
    if let Some(outcome) = single(query, exact_slug, label) {
        return outcome;
    }

    let exact_title: Vec<&Protocol> = protocols
        .iter()
        .filter(|p| p.title.to_lowercase() == q)
        .collect();
    if let Some(outcome) = single(query, exact_title, label) {
        return outcome;
    }

    let title_substring: Vec<&Protocol> = protocols
        .iter()
        .filter(|p| {
            let title = p.title.to_lowercase();
            title.contains(&q) || q.contains(&title)
        })
        .collect();
    if let Some(outcome) = single(query, title_substring, label) {
        return outcome;
    }

    let slug_substring: Vec<&Protocol> = protocols
        .iter()
        .filter(|p| p.slug.to_lowercase().contains(&q))
        .collect();
    if let Some(outcome) = single(query, slug_substring, label) {
        return outcome;
    }

    Err(ResolveFailure::NotFound {
        query: query.trim().to_string(),
    })
}
