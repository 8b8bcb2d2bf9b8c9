//! Trip slug derivation.

use crate::TripId;

const SUFFIX_LEN: usize = 6;

/// Derives the URL slug for a trip from its name and id.
///
/// The name part is the usual lowercase-hyphenated form; the suffix comes from
/// the random tail of the id so two trips with the same name (possibly created
/// on different devices while offline) do not collide on the unique slug index.
/// The result depends only on its inputs, so a replayed create carries the
/// same slug the optimistic write stored.
#[must_use]
pub fn trip_slug(name: &str, id: &TripId) -> String {
    let simple = id.as_uuid().simple().to_string();
    let suffix = &simple[simple.len() - SUFFIX_LEN..];

    let base = ::slug::slugify(name);
    if base.is_empty() {
        format!("trip-{suffix}")
    } else {
        format!("{base}-{suffix}")
    }
}
