use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VttError {
    #[error("missing WEBVTT header")]
    MissingHeader,
    #[error("malformed cue timing: {0}")]
    BadTiming(String),
    #[error("cue starts after it ends: {0}")]
    InvertedCue(String),
    #[error("cue timestamps not monotonically increasing at: {0}")]
    NonMonotonic(String),
}

/// Checks the invariant on stored captions: a `WEBVTT` header and
/// monotonically increasing cue start times.
pub fn validate(vtt: &str) -> Result<(), VttError> {
    let body = vtt.trim_start_matches('\u{feff}');
    let first_line = body.lines().next().unwrap_or_default();
    if !first_line.starts_with("WEBVTT") {
        return Err(VttError::MissingHeader);
    }
    let mut previous_start: Option<u64> = None;
    for line in body.lines() {
        let Some((start_raw, end_raw)) = line.split_once("-->") else {
            continue;
        };
        let timing = line.trim().to_string();
        let start = parse_timestamp_ms(start_raw.trim())
            .ok_or_else(|| VttError::BadTiming(timing.clone()))?;
        // Cue settings may trail the end timestamp.
        let end_token = end_raw.trim().split_whitespace().next().unwrap_or_default();
        let end =
            parse_timestamp_ms(end_token).ok_or_else(|| VttError::BadTiming(timing.clone()))?;
        if end < start {
            return Err(VttError::InvertedCue(timing));
        }
        if let Some(previous) = previous_start {
            if start < previous {
                return Err(VttError::NonMonotonic(timing));
            }
        }
        previous_start = Some(start);
    }
    Ok(())
}

/// `HH:MM:SS.mmm` or `MM:SS.mmm`.
fn parse_timestamp_ms(raw: &str) -> Option<u64> {
    let (clock, millis) = raw.split_once('.')?;
    if millis.len() != 3 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;
    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds): (u64, u64, u64) = match parts.as_slice() {
        [h, m, s] => (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?),
        [m, s] => (0, m.parse().ok()?, s.parse().ok()?),
        _ => return None,
    };
    if minutes >= 60 || seconds >= 60 {
        return None;
    }
    // Provider output is untrusted; an absurd hour field must reject, not
    // wrap.
    hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?
        .checked_mul(1000)?
        .checked_add(millis)
}
