//! Hard caps on per-provider state and request fields.

pub const MAX_TENANTS: usize = 10_000;
pub const MAX_TENANT_NAME_LEN: usize = 128;

/// One slot per minute of the day is the densest possible grid.
pub const MAX_SLOTS_PER_DAY: usize = 1_440;
pub const MAX_RESERVATIONS_PER_DAY: usize = 50_000;
pub const MAX_SLOT_CAPACITY: u32 = 10_000;
pub const MAX_WINDOWS_PER_PLAN: usize = 48;

pub const MAX_SERVICES: usize = 1_000;
pub const MAX_SERVICE_NAME_LEN: usize = 200;

/// A booking can cover at most one whole day.
pub const MAX_DURATION_MIN: u32 = 1_440;

pub const MAX_CUSTOMER_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_TOKEN_LEN: usize = 2_048;
