//! Error types for U2F ceremony processing.

use openssl::error::ErrorStack as OpenSSLErrorStack;
use serde_json::error::Error as JSONError;
use thiserror::Error;

/// Possible failures of the U2F ceremonies. `CounterReplay` and
/// `DeviceCompromised` are security signals rather than ordinary failed
/// logins - callers should alert and force re-enrolment, not re-prompt.
#[derive(Debug, Error)]
pub enum U2fError {
    /// The client data `typ` does not match the ceremony being executed.
    /// Accepting a registration client data during authentication (or vice
    /// versa) would be a ceremony confusion attack.
    #[error("client data type does not match the ceremony in progress")]
    InvalidClientDataType,

    /// The challenge echoed by the token is not the challenge this relying
    /// party issued for the session.
    #[error("client data challenge does not match the issued challenge")]
    MismatchedChallenge,

    /// The client data origin does not match the origin the configuration
    /// requires.
    #[error("client data origin does not match the relying party origin")]
    InvalidOrigin,

    /// The key handle echoed in the response is not the key handle of the
    /// registration being authenticated.
    #[error("response key handle does not match the stored registration")]
    MismatchedKeyHandle,

    /// Raw registration data was structurally invalid - bad reserved byte
    /// or bad certificate framing.
    #[error("malformed registration data")]
    InvalidRegistrationData,

    /// A raw public key was not a valid 65 byte uncompressed P-256 point,
    /// or a certificate did not contain an EC key on P-256.
    #[error("malformed or non P-256 public key")]
    MalformedPublicKey,

    /// The cryptographic signature did not verify. The ceremony must not
    /// proceed.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The token presented a counter less than or equal to the last accepted
    /// value. The device may have been cloned, and the registration is now
    /// marked compromised.
    #[error("counter value smaller than expected - possible cloned device")]
    CounterReplay,

    /// The registration was previously marked compromised and is rejected
    /// unconditionally.
    #[error("device is marked compromised")]
    DeviceCompromised,

    /// The cryptographically secure random source failed. Fatal, not
    /// retryable.
    #[error("secure random source unavailable")]
    CryptoUnavailable,

    /// Wire data was not enough bytes to decode the claimed structure.
    #[error("insufficient bytes available to parse")]
    ParseInsufficientBytesAvailable,

    /// JSON in the wire models failed to parse. Base64 decode failures
    /// inside client data surface here too, as the websafe-b64 fields are
    /// decoded during deserialisation.
    #[error("json parse failure: {0}")]
    ParseJSONFailure(#[from] JSONError),

    /// The cryptographic provider reported a fault unrelated to signature
    /// validity.
    #[error("openssl error: {0}")]
    OpenSSLError(#[from] OpenSSLErrorStack),
}
