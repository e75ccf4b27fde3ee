/// The weakest reportable strength.
pub const MIN_SIGNAL_LEVEL: u8 = 1;
/// The strongest reportable strength.
pub const MAX_SIGNAL_LEVEL: u8 = 5;

/// Maps a raw received-signal-strength reading to a 1..=5 scale.
///
/// RSSI usually ranges from about -30 (very close) to -90 (far).
/// The thresholds are fixed, and the result never decreases as the reading increases.
pub fn signal_level(signal_raw: i32) -> u8 {
    if signal_raw >= -35 {
        return 5;
    }

    if signal_raw >= -50 {
        return 4;
    }

    if signal_raw >= -65 {
        return 3;
    }

    if signal_raw >= -80 {
        return 2;
    }

    MIN_SIGNAL_LEVEL
}
