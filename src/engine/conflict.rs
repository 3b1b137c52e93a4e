use chrono::NaiveTime;
use ulid::Ulid;

use crate::limits::{ROOM_MENU_FIRST_HOUR, ROOM_MENU_SLOTS};
use crate::model::*;

/// A booking that still occupies the room.
fn occupies(b: &RoomReservation) -> bool {
    matches!(
        b.status,
        RoomReservationStatus::Active | RoomReservationStatus::InProgress
    )
}

/// First occupying booking on the day overlapping `span`, skipping `exclude`.
pub(crate) fn find_conflict<'a>(
    day: &'a RoomDay,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a RoomReservation> {
    day.overlapping(span)
        .filter(|b| occupies(b) && Some(b.id) != exclude)
        .find(|b| b.span.overlaps(span))
}

/// The fixed menu of one-hour candidates, ids starting at 1.
pub(crate) fn candidate_menu() -> Vec<(u32, Span)> {
    (0..ROOM_MENU_SLOTS)
        .filter_map(|i| {
            let hour = ROOM_MENU_FIRST_HOUR + i;
            let start = NaiveTime::from_hms_opt(hour, 0, 0)?;
            let end = NaiveTime::from_hms_opt(hour + 1, 0, 0)?;
            Some((i + 1, Span::new(start, end)))
        })
        .collect()
}

/// Candidates not overlapped by any occupying booking.
pub(crate) fn free_candidates(day: Option<&RoomDay>) -> Vec<CandidateSlot> {
    candidate_menu()
        .into_iter()
        .filter(|(_, span)| day.is_none_or(|d| find_conflict(d, span, None).is_none()))
        .map(|(id, span)| CandidateSlot {
            id,
            time_range: span.label(),
        })
        .collect()
}
