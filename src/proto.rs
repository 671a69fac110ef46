//! Implementations of the U2F protocol structures that are json encoded on
//! the wire, the raw binary layouts the token signs, and the persisted
//! device registration record.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::base64_data::Base64UrlSafeData;
use crate::constants::{
    CLIENT_DATA_TYPE_AUTHENTICATE, CLIENT_DATA_TYPE_REGISTER, INITIAL_COUNTER_VALUE,
    PUBLIC_KEY_SIZE_BYTES, REGISTRATION_RESERVED_BYTE, U2F_V2,
};
use crate::error::U2fError;

/// A challenge issued by this relying party. Single use - the caller stores
/// it keyed by session and discards it once a ceremony completes, success
/// or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge(pub Base64UrlSafeData);

impl Challenge {
    /// Wrap raw challenge bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Challenge(Base64UrlSafeData(bytes))
    }
}

impl AsRef<[u8]> for Challenge {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// The counter a token reports on every authentication. Strictly increasing
/// values are how cloned tokens are detected.
pub type Counter = u32;

/// The ceremony a client data blob belongs to, from its `typ` field. Any
/// other string fails deserialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientDataType {
    /// `navigator.id.finishEnrollment` - a registration ceremony.
    #[serde(rename = "navigator.id.finishEnrollment")]
    Register,
    /// `navigator.id.getAssertion` - an authentication ceremony.
    #[serde(rename = "navigator.id.getAssertion")]
    Authenticate,
}

impl ClientDataType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ClientDataType::Register => CLIENT_DATA_TYPE_REGISTER,
            ClientDataType::Authenticate => CLIENT_DATA_TYPE_AUTHENTICATE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientDataFields {
    typ: ClientDataType,
    challenge: Base64UrlSafeData,
    origin: String,
}

/// The client data the browser layer produced and the token signed.
///
/// The original received bytes are retained verbatim: the signature covers
/// a hash of exactly those bytes, and re-serialising a parsed structure
/// could change them byte-for-byte and invalidate a correct signature.
#[derive(Debug, Clone)]
pub struct ClientData {
    typ: ClientDataType,
    challenge: Base64UrlSafeData,
    origin: String,
    raw: Vec<u8>,
}

impl ClientData {
    /// Parse client data from the exact bytes received on the wire.
    pub fn parse(raw: Vec<u8>) -> Result<ClientData, U2fError> {
        let fields: ClientDataFields = serde_json::from_slice(&raw)?;
        Ok(ClientData {
            typ: fields.typ,
            challenge: fields.challenge,
            origin: fields.origin,
            raw,
        })
    }

    /// The ceremony type the client asserted.
    pub fn type_(&self) -> ClientDataType {
        self.typ
    }

    /// The challenge the token echoed, decoded from websafe-b64.
    pub fn challenge(&self) -> &Base64UrlSafeData {
        &self.challenge
    }

    /// The origin the client asserted.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The bytes as received, never re-encoded. This is what gets hashed
    /// into the challenge parameter.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// The request `start_registration` hands to the client javascript
/// `u2f.register` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Always `U2F_V2`.
    pub version: String,
    /// The challenge the token must echo and sign over.
    pub challenge: Base64UrlSafeData,
    /// The application id this registration is bound to.
    pub app_id: String,
}

impl RegisterRequest {
    pub(crate) fn new(challenge: &Challenge, app_id: &str) -> Self {
        RegisterRequest {
            version: U2F_V2.to_string(),
            challenge: challenge.0.clone(),
            app_id: app_id.to_string(),
        }
    }
}

/// The registration response produced by the client javascript API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// websafe-b64 of the raw registration data from the token.
    pub registration_data: Base64UrlSafeData,
    /// websafe-b64 of the exact client data json bytes.
    pub client_data: Base64UrlSafeData,
}

/// The request `start_authentication` hands to the client javascript
/// `u2f.sign` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    /// Always `U2F_V2`.
    pub version: String,
    /// The challenge the token must echo and sign over.
    pub challenge: Base64UrlSafeData,
    /// The application id the registration is bound to.
    pub app_id: String,
    /// The key handle identifying which registered credential to use.
    pub key_handle: Base64UrlSafeData,
}

impl SignRequest {
    pub(crate) fn new(challenge: &Challenge, app_id: &str, key_handle: &[u8]) -> Self {
        SignRequest {
            version: U2F_V2.to_string(),
            challenge: challenge.0.clone(),
            app_id: app_id.to_string(),
            key_handle: key_handle.into(),
        }
    }
}

/// The authentication response produced by the client javascript API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// The key handle originally passed in the sign request.
    pub key_handle: Base64UrlSafeData,
    /// websafe-b64 of the raw signature data from the token.
    pub signature_data: Base64UrlSafeData,
    /// websafe-b64 of the exact client data json bytes.
    pub client_data: Base64UrlSafeData,
}

/// Decoded raw registration data (U2F raw message formats §4.3):
/// `0x05 || user public key (65) || kh length (1) || key handle ||
/// attestation cert (DER) || signature (DER)`.
#[derive(Debug, Clone)]
pub struct RegistrationData {
    /// The device's public key as a raw uncompressed point.
    pub user_public_key: Vec<u8>,
    /// The token-issued opaque credential identifier.
    pub key_handle: Vec<u8>,
    /// The attestation certificate, DER.
    pub attestation_cert: Vec<u8>,
    /// The attestation signature, DER ECDSA.
    pub signature: Vec<u8>,
}

impl TryFrom<&[u8]> for RegistrationData {
    type Error = U2fError;

    fn try_from(data: &[u8]) -> Result<RegistrationData, U2fError> {
        // Reserved byte, public key and key handle length at minimum.
        if data.len() < 1 + PUBLIC_KEY_SIZE_BYTES + 1 {
            return Err(U2fError::ParseInsufficientBytesAvailable);
        }

        if data[0] != REGISTRATION_RESERVED_BYTE {
            return Err(U2fError::InvalidRegistrationData);
        }

        let user_public_key = data[1..1 + PUBLIC_KEY_SIZE_BYTES].to_vec();

        let kh_len = data[1 + PUBLIC_KEY_SIZE_BYTES] as usize;
        let kh_start = 1 + PUBLIC_KEY_SIZE_BYTES + 1;
        if data.len() < kh_start + kh_len {
            return Err(U2fError::ParseInsufficientBytesAvailable);
        }
        let key_handle = data[kh_start..kh_start + kh_len].to_vec();

        // The certificate's length is only knowable from its DER header;
        // everything after it is the signature.
        let remainder = &data[kh_start + kh_len..];
        let cert_len = der_object_length(remainder)?;
        if remainder.len() <= cert_len {
            // A zero length signature can never verify.
            return Err(U2fError::ParseInsufficientBytesAvailable);
        }
        let attestation_cert = remainder[..cert_len].to_vec();
        let signature = remainder[cert_len..].to_vec();

        Ok(RegistrationData {
            user_public_key,
            key_handle,
            attestation_cert,
            signature,
        })
    }
}

/// Total encoded length of the DER object at the start of `data`. Only the
/// definite length forms a certificate can use are accepted.
fn der_object_length(data: &[u8]) -> Result<usize, U2fError> {
    if data.len() < 2 {
        return Err(U2fError::ParseInsufficientBytesAvailable);
    }
    // An X.509 certificate is a SEQUENCE.
    if data[0] != 0x30 {
        return Err(U2fError::InvalidRegistrationData);
    }
    match data[1] {
        n @ 0x00..=0x7f => Ok(2 + n as usize),
        0x81 => {
            if data.len() < 3 {
                return Err(U2fError::ParseInsufficientBytesAvailable);
            }
            Ok(3 + data[2] as usize)
        }
        0x82 => {
            if data.len() < 4 {
                return Err(U2fError::ParseInsufficientBytesAvailable);
            }
            Ok(4 + BigEndian::read_u16(&data[2..4]) as usize)
        }
        _ => Err(U2fError::InvalidRegistrationData),
    }
}

/// Decoded raw signature data (U2F raw message formats §5.4):
/// `user presence (1) || counter (4, big endian) || signature (DER)`.
#[derive(Debug, Clone)]
pub struct SignatureData {
    /// User presence byte as reported by the token.
    pub user_presence: u8,
    /// The token's usage counter.
    pub counter: Counter,
    /// The assertion signature, DER ECDSA.
    pub signature: Vec<u8>,
}

impl TryFrom<&[u8]> for SignatureData {
    type Error = U2fError;

    fn try_from(data: &[u8]) -> Result<SignatureData, U2fError> {
        if data.len() < 6 {
            return Err(U2fError::ParseInsufficientBytesAvailable);
        }
        Ok(SignatureData {
            user_presence: data[0],
            counter: BigEndian::read_u32(&data[1..5]),
            signature: data[5..].to_vec(),
        })
    }
}

/// Whether a device registration is still trustworthy. `Compromised` is
/// terminal: no transition leaves it, and nothing in this crate ever sets
/// a registration back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// The device has behaved correctly so far.
    Active,
    /// The device presented a replayed or stale counter and may be cloned.
    Compromised,
}

/// The persisted record of one enrolled token. You must store this
/// associated to the account that registered it, and serialise updates to a
/// single record - two racing counter updates would defeat the anti-cloning
/// check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistration {
    /// The token-issued opaque credential identifier, used for lookup.
    pub key_handle: Base64UrlSafeData,
    /// The device public key, 65 byte raw uncompressed point.
    pub public_key: Base64UrlSafeData,
    /// The manufacturer attestation certificate captured at registration,
    /// DER.
    pub attestation_cert: Base64UrlSafeData,
    counter: Counter,
    state: DeviceState,
}

impl DeviceRegistration {
    pub(crate) fn new(
        key_handle: Vec<u8>,
        public_key: Vec<u8>,
        attestation_cert: Vec<u8>,
    ) -> Self {
        DeviceRegistration {
            key_handle: key_handle.into(),
            public_key: public_key.into(),
            attestation_cert: attestation_cert.into(),
            counter: INITIAL_COUNTER_VALUE,
            state: DeviceState::Active,
        }
    }

    /// The last counter value accepted from this device.
    pub fn counter(&self) -> Counter {
        self.counter
    }

    /// True once the device has ever presented a non-increasing counter.
    pub fn is_compromised(&self) -> bool {
        self.state == DeviceState::Compromised
    }

    /// Apply a token-reported counter to this record.
    ///
    /// A value less than or equal to the stored counter means a previously
    /// used or stale counter was presented - the signing key may exist in
    /// more than one place. The record is marked compromised and stays that
    /// way; the caller must still persist the record so the flag sticks.
    ///
    /// A device that always reports 0 can never pass the first check
    /// against the initial counter value. That is intentional: such a
    /// token provides no cloning protection at all.
    ///
    /// Note the check only rejects non-increasing values; it places no
    /// bound on how far ahead a counter may jump.
    pub fn check_and_update_counter(&mut self, client_counter: Counter) -> Result<Counter, U2fError> {
        if client_counter <= self.counter {
            self.state = DeviceState::Compromised;
            return Err(U2fError::CounterReplay);
        }
        self.counter = client_counter;
        Ok(self.counter)
    }

    /// Json projection of this record without the attestation certificate,
    /// for callers that expose registrations to end users.
    pub fn to_json_without_attestation_cert(&self) -> Result<String, U2fError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct DeviceWithoutCertificate<'a> {
            key_handle: &'a Base64UrlSafeData,
            public_key: &'a Base64UrlSafeData,
            counter: Counter,
            state: DeviceState,
        }
        serde_json::to_string(&DeviceWithoutCertificate {
            key_handle: &self.key_handle,
            public_key: &self.public_key,
            counter: self.counter,
            state: self.state,
        })
        .map_err(U2fError::ParseJSONFailure)
    }
}

/// Equality identifies the credential, so the counter is excluded - it
/// changes on every use.
impl PartialEq for DeviceRegistration {
    fn eq(&self, other: &Self) -> bool {
        self.key_handle == other.key_handle
            && self.public_key == other.public_key
            && self.attestation_cert == other.attestation_cert
            && self.state == other.state
    }
}

impl Eq for DeviceRegistration {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_device() -> DeviceRegistration {
        DeviceRegistration::new(vec![1; 32], vec![4; 65], vec![0x30, 0x01, 0xff])
    }

    #[test]
    fn client_data_preserves_raw_bytes() {
        // Spacing and field order below would not survive re-serialisation.
        let raw = br#"{ "origin": "https://example.com",
            "typ": "navigator.id.finishEnrollment", "challenge": "aGVsbG8" }"#;
        let cd = ClientData::parse(raw.to_vec()).unwrap();
        assert_eq!(cd.raw_bytes(), raw);
        assert_eq!(cd.type_(), ClientDataType::Register);
        assert_eq!(cd.challenge().as_ref(), b"hello");
        assert_eq!(cd.origin(), "https://example.com");
    }

    #[test]
    fn client_data_missing_challenge_rejected() {
        let raw = br#"{"typ": "navigator.id.getAssertion", "origin": "https://example.com"}"#;
        assert!(matches!(
            ClientData::parse(raw.to_vec()),
            Err(U2fError::ParseJSONFailure(_))
        ));
    }

    #[test]
    fn client_data_unknown_typ_rejected() {
        let raw = br#"{"typ": "nonsense", "challenge": "aGVsbG8", "origin": "https://example.com"}"#;
        assert!(matches!(
            ClientData::parse(raw.to_vec()),
            Err(U2fError::ParseJSONFailure(_))
        ));
    }

    #[test]
    fn client_data_undecodable_challenge_rejected() {
        // Base64 failures happen inside deserialisation, so they surface
        // as a json parse failure rather than a separate kind.
        let raw = br#"{"typ": "navigator.id.getAssertion", "challenge": "!!not base64!!", "origin": "https://example.com"}"#;
        assert!(matches!(
            ClientData::parse(raw.to_vec()),
            Err(U2fError::ParseJSONFailure(_))
        ));
    }

    #[test]
    fn client_data_not_json_rejected() {
        assert!(matches!(
            ClientData::parse(b"not json at all".to_vec()),
            Err(U2fError::ParseJSONFailure(_))
        ));
    }

    #[test]
    fn registration_data_round_trip() {
        let mut data = vec![REGISTRATION_RESERVED_BYTE];
        data.extend_from_slice(&[4; PUBLIC_KEY_SIZE_BYTES]);
        data.push(2);
        data.extend_from_slice(&[0xaa, 0xbb]);
        // Short form DER "certificate" of 3 content bytes.
        data.extend_from_slice(&[0x30, 0x03, 0x01, 0x02, 0x03]);
        data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let rd = RegistrationData::try_from(data.as_slice()).unwrap();
        assert_eq!(rd.user_public_key, vec![4; PUBLIC_KEY_SIZE_BYTES]);
        assert_eq!(rd.key_handle, vec![0xaa, 0xbb]);
        assert_eq!(rd.attestation_cert, vec![0x30, 0x03, 0x01, 0x02, 0x03]);
        assert_eq!(rd.signature, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn registration_data_bad_reserved_byte_rejected() {
        let mut data = vec![0x06];
        data.extend_from_slice(&[4; PUBLIC_KEY_SIZE_BYTES + 1]);
        assert!(matches!(
            RegistrationData::try_from(data.as_slice()),
            Err(U2fError::InvalidRegistrationData)
        ));
    }

    #[test]
    fn registration_data_truncated_rejected() {
        let data = vec![REGISTRATION_RESERVED_BYTE; 40];
        assert!(matches!(
            RegistrationData::try_from(data.as_slice()),
            Err(U2fError::ParseInsufficientBytesAvailable)
        ));

        // Key handle length byte claims more than is present.
        let mut data = vec![REGISTRATION_RESERVED_BYTE];
        data.extend_from_slice(&[4; PUBLIC_KEY_SIZE_BYTES]);
        data.push(200);
        data.extend_from_slice(&[0; 10]);
        assert!(matches!(
            RegistrationData::try_from(data.as_slice()),
            Err(U2fError::ParseInsufficientBytesAvailable)
        ));
    }

    #[test]
    fn registration_data_long_form_cert_length() {
        // 0x82 length form, 256 content bytes.
        let mut cert = vec![0x30, 0x82, 0x01, 0x00];
        cert.extend_from_slice(&[0xcc; 256]);

        let mut data = vec![REGISTRATION_RESERVED_BYTE];
        data.extend_from_slice(&[4; PUBLIC_KEY_SIZE_BYTES]);
        data.push(0);
        data.extend_from_slice(&cert);
        data.push(0x99);

        let rd = RegistrationData::try_from(data.as_slice()).unwrap();
        assert_eq!(rd.key_handle, Vec::<u8>::new());
        assert_eq!(rd.attestation_cert, cert);
        assert_eq!(rd.signature, vec![0x99]);
    }

    #[test]
    fn signature_data_decodes_big_endian_counter() {
        let data = [0x01, 0x00, 0x00, 0x01, 0x02, 0x30, 0x00];
        let sd = SignatureData::try_from(data.as_slice()).unwrap();
        assert_eq!(sd.user_presence, 0x01);
        assert_eq!(sd.counter, 258);
        assert_eq!(sd.signature, vec![0x30, 0x00]);
    }

    #[test]
    fn signature_data_too_short_rejected() {
        assert!(matches!(
            SignatureData::try_from([0x01, 0x00, 0x00].as_slice()),
            Err(U2fError::ParseInsufficientBytesAvailable)
        ));
    }

    #[test]
    fn counter_must_strictly_increase() {
        let mut device = test_device();
        assert_eq!(device.counter(), INITIAL_COUNTER_VALUE);

        assert_eq!(device.check_and_update_counter(1).unwrap(), 1);
        assert_eq!(device.check_and_update_counter(5).unwrap(), 5);
        assert_eq!(device.counter(), 5);

        // Equal and stale values both mark the device compromised.
        assert!(matches!(
            device.check_and_update_counter(5),
            Err(U2fError::CounterReplay)
        ));
        assert!(device.is_compromised());
        // The stored counter did not adopt the replayed value.
        assert_eq!(device.counter(), 5);
    }

    #[test]
    fn zero_counter_never_authenticates() {
        let mut device = test_device();
        assert!(matches!(
            device.check_and_update_counter(0),
            Err(U2fError::CounterReplay)
        ));
        assert!(device.is_compromised());
    }

    #[test]
    fn compromised_state_is_sticky() {
        let mut device = test_device();
        device.check_and_update_counter(0).unwrap_err();
        // Even an otherwise valid increase does not clear the flag.
        device.check_and_update_counter(10).unwrap();
        assert!(device.is_compromised());
    }

    #[test]
    fn equality_excludes_counter() {
        let mut a = test_device();
        let b = test_device();
        a.check_and_update_counter(3).unwrap();
        assert_eq!(a, b);

        let mut c = test_device();
        c.check_and_update_counter(0).unwrap_err();
        assert_ne!(b, c);
    }

    #[test]
    fn device_registration_serde_round_trip() {
        let device = test_device();
        let json = serde_json::to_string(&device).unwrap();
        let back: DeviceRegistration = serde_json::from_str(&json).unwrap();
        assert_eq!(device, back);
        assert_eq!(device.counter(), back.counter());
    }

    #[test]
    fn json_without_attestation_cert_omits_it() {
        let device = test_device();
        let json = device.to_json_without_attestation_cert().unwrap();
        assert!(!json.contains("attestation"));
        assert!(json.contains("keyHandle"));
    }
}
