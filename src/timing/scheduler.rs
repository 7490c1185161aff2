use tracing::warn;

use super::NormalizedTrack;
use crate::events::ScheduledEvent;

/// (tick, tie-break, track, position within track)
type SortKey = (u64, i32, usize, usize);

fn tag_track(track: &NormalizedTrack) -> Vec<(SortKey, ScheduledEvent)> {
    track
        .events
        .iter()
        .enumerate()
        .map(|(seq, e)| {
            let event = ScheduledEvent::new(track.info.index, e.tick, e.channel, e.message.clone());
            ((event.tick, event.tie_break, event.track, seq), event)
        })
        .collect()
}

/// Merges all tracks into one timeline ordered by tick, then program changes,
/// other events and note-ons by ascending pitch. Remaining ties fall back to
/// track index and file order, so the result is identical on every run.
pub fn schedule(tracks: &[NormalizedTrack]) -> Vec<ScheduledEvent> {
    let tagged = if tracks.len() > 1 {
        let parallel = crossbeam::scope(|s| {
            let handles: Vec<_> = tracks
                .iter()
                .map(|track| s.spawn(move |_| tag_track(track)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<Result<Vec<_>, _>>()
        });
        match parallel {
            Ok(Ok(tagged)) => tagged,
            _ => {
                warn!("parallel track tagging failed, retrying on the current thread");
                tracks.iter().map(tag_track).collect()
            }
        }
    } else {
        tracks.iter().map(tag_track).collect()
    };

    let mut merged: Vec<(SortKey, ScheduledEvent)> = tagged.into_iter().flatten().collect();
    // Keys are unique, so an unstable sort is still deterministic.
    merged.sort_unstable_by_key(|(key, _)| *key);
    merged.into_iter().map(|(_, event)| event).collect()
}
