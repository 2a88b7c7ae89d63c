/// Days of explicit slot rows kept from today forward.
pub const DAYS_TO_MAINTAIN: u32 = 30;

/// Rows per durable insert when the maintenance job materializes slots.
pub const MAINTENANCE_BATCH_SIZE: usize = 100;

pub const MAX_STUDIOS: usize = 1_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4_096;
pub const MAX_USER_ID_LEN: usize = 128;

/// Hard ceiling on any studio's `max_booking_duration`, in hours.
pub const MAX_BOOKING_HOURS: u8 = 12;

/// Hard ceiling on any studio's `max_guests`.
pub const MAX_GUESTS: u32 = 100;

/// Bookings kept in memory per studio before new commits are refused.
pub const MAX_BOOKINGS_PER_STUDIO: usize = 200_000;

/// Upper bound on the serialized booking draft carried in payment metadata.
pub const MAX_DRAFT_METADATA_LEN: usize = 500;
