/// Max bytes in a patient phone number.
pub const MAX_PHONE_LEN: usize = 32;

/// Max bytes in a patient display name.
pub const MAX_NAME_LEN: usize = 256;

/// Max bytes in patient notes, appointment notes and block reasons.
pub const MAX_NOTE_LEN: usize = 2048;

/// Widest administrative block, in days.
pub const MAX_BLOCK_DAYS: i64 = 366;

/// Widest list-blocks window, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;
