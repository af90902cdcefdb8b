//! Day-of-week conventions.
//!
//! Local storage numbers days 1 (Sunday) through 7 (Saturday). The wire uses
//! 0 (Sunday) through 6 (Saturday). Conversion clamps instead of rejecting.

/// Every wire day, Sunday first.
pub const ALL_WIRE_DAYS: [i32; 7] = [0, 1, 2, 3, 4, 5, 6];

/// Every local day, Sunday first.
pub const ALL_LOCAL_DAYS: [u8; 7] = [1, 2, 3, 4, 5, 6, 7];

pub fn local_to_wire(day: u8) -> i32 {
    (i32::from(day) - 1).clamp(0, 6)
}

pub fn wire_to_local(day: i32) -> u8 {
    // clamp keeps the value in 1..=7 so the cast is lossless
    (day.clamp(0, 6) + 1) as u8
}

pub fn local_days_to_wire(days: &[u8]) -> Vec<i32> {
    days.iter().copied().map(local_to_wire).collect()
}

/// Convert incoming wire days, dropping duplicates produced by clamping.
pub fn wire_days_to_local(days: &[i32]) -> Vec<u8> {
    let mut out: Vec<u8> = days.iter().copied().map(wire_to_local).collect();
    out.sort_unstable();
    out.dedup();
    out
}
