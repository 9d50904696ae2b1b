//! Event normalization: turn raw extraction candidates into persistable
//! events, or discard them.
//!
//! Two quirks of the model output are handled here. First, "empty" answers
//! arrive in many shapes — null, "", "null", "undefined", or a token too
//! short to be meaningful — so presence is a heuristic, not a null check.
//! Second, datetimes come back as Eastern wall-clock values wrongly suffixed
//! as UTC; they are reinterpreted in the Eastern zone (DST-correct for the
//! calendar date) and converted to true UTC instants.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use regex::Regex;

use campusbeat_common::{EventCandidate, NewEvent};

/// Anything shorter than this after trimming is noise, not a field value.
const MIN_MEANINGFUL_LEN: usize = 8;

static NULLISH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)null|undefined").expect("valid regex"));

/// Whether a candidate field should be treated as absent: missing, trims to
/// under 8 characters, or contains a literal "null"/"undefined" the model
/// echoed back as text.
pub fn field_is_nullish(field: Option<&str>) -> bool {
    let Some(value) = field else {
        return true;
    };

    let trimmed = value.trim();
    if trimmed.len() < MIN_MEANINGFUL_LEN {
        return true;
    }

    NULLISH_RE.is_match(trimmed)
}

/// Reinterpret a model-produced datetime as Eastern wall-clock time and
/// convert to UTC. Accepts a trailing `Z` or `+00:00` (the mis-tag) and
/// optional fractional seconds. Ambiguous wall-clock values during the
/// fall-back hour take the earlier offset.
pub fn eastern_wall_clock_to_utc(raw: &str) -> Option<DateTime<Utc>> {
    let literal = raw
        .trim()
        .trim_end_matches("+00:00")
        .trim_end_matches('Z');

    let naive = NaiveDateTime::parse_from_str(literal, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(literal, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()?;

    let eastern = New_York.from_local_datetime(&naive).earliest()?;
    Some(eastern.with_timezone(&Utc))
}

/// Validate one candidate and convert it to an insertable event.
///
/// `title`, `description`, `start_datetime`, and `location` must all be
/// present by the heuristic; an unparseable start discards the candidate; a
/// missing or unparseable end becomes `None`.
pub fn normalize_candidate(candidate: &EventCandidate) -> Option<NewEvent> {
    let required = [
        candidate.title.as_deref(),
        candidate.description.as_deref(),
        candidate.start_datetime.as_deref(),
        candidate.location.as_deref(),
    ];
    if required.iter().any(|f| field_is_nullish(*f)) {
        return None;
    }

    let start_datetime = eastern_wall_clock_to_utc(candidate.start_datetime.as_deref()?)?;

    let end_datetime = candidate
        .end_datetime
        .as_deref()
        .filter(|e| !field_is_nullish(Some(e)))
        .and_then(eastern_wall_clock_to_utc);

    let incentives = candidate
        .incentives
        .clone()
        .filter(|i| !i.trim().is_empty());

    Some(NewEvent {
        post_id: candidate.post_id,
        title: candidate.title.clone()?,
        description: candidate.description.clone(),
        start_datetime,
        end_datetime,
        location: candidate.location.clone()?,
        incentives,
    })
}
