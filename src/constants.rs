// Fixed by the U2F raw message format specification.
pub const CHALLENGE_SIZE_BYTES: usize = 32;

/// Uncompressed P-256 point: 0x04 tag, 32 byte X, 32 byte Y.
pub const PUBLIC_KEY_SIZE_BYTES: usize = 65;
pub const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

/// Leading reserved byte of raw registration data.
pub const REGISTRATION_RESERVED_BYTE: u8 = 0x05;

/// Counter value a freshly registered device starts from.
pub const INITIAL_COUNTER_VALUE: u32 = 0;

/// Protocol version string advertised to the client javascript API.
pub const U2F_V2: &str = "U2F_V2";

// Client data `typ` values, one per ceremony.
pub const CLIENT_DATA_TYPE_REGISTER: &str = "navigator.id.finishEnrollment";
pub const CLIENT_DATA_TYPE_AUTHENTICATE: &str = "navigator.id.getAssertion";
