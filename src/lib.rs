//! u2f-rs - FIDO U2F for Rust Server Applications
//!
//! U2F is a challenge-response protocol allowing hardware security tokens to
//! act as a phishing resistant second factor. This library implements the
//! relying party side: it issues challenges, verifies token registration
//! responses, binds a device's public key and attestation certificate to an
//! account, and verifies subsequent authentications while enforcing the
//! anti-cloning usage counter.
//!
//! To use this library you will want to implement the `U2fConfig` trait for
//! your site, and use the `U2f` struct for ceremony interactions. This
//! library performs no IO: you store challenges keyed by session, persist
//! the `DeviceRegistration` records it returns, and serialise access to a
//! single registration's counter update.

#![warn(missing_docs)]

#[macro_use]
extern crate tracing;

mod base64_data;
mod constants;
pub mod crypto;
pub mod ephemeral;
pub mod error;
pub mod proto;

use std::convert::TryFrom;

use crate::crypto::{compute_sha256, SignatureVerifier, U2fPublicKey, X509PublicKey};
use crate::error::U2fError;
use crate::proto::{
    Challenge, ClientData, ClientDataType, Counter, DeviceRegistration, RegisterRequest,
    RegisterResponse, RegistrationData, SignRequest, SignResponse, SignatureData,
};

pub use crate::base64_data::Base64UrlSafeData;

/// This is the core of the U2F operations. It provides the ceremony
/// interfaces you will use:
///
/// * `start_registration` / `register_credential`
/// * `start_authentication` / `authenticate_credential`
///
/// The start functions return json requests intended to be processed by the
/// client javascript API, and the finish functions receive the client's
/// json responses for verification. You must store the issued `Challenge`
/// keyed by session (single use, discarded after the ceremony completes
/// either way) and persist the `DeviceRegistration` values the finish
/// functions produce or update.
#[derive(Debug)]
pub struct U2f<T> {
    config: T,
    app_param: Vec<u8>,
}

impl<T> U2f<T> {
    /// Create a new U2f instance with the supplied configuration. The
    /// application parameter hash is computed once here, as it is constant
    /// for the lifetime of the relying party.
    pub fn new(config: T) -> Self
    where
        T: U2fConfig,
    {
        let app_param = compute_sha256(config.get_app_id().as_bytes());
        U2f { config, app_param }
    }

    /// Generate a single-use 32 byte challenge from the provider's CSPRNG.
    /// Fails with `CryptoUnavailable` if the entropy source does - there is
    /// no non-cryptographic fallback.
    pub fn generate_challenge(&self) -> Result<Challenge, U2fError> {
        crypto::secure_random_challenge().map(Challenge::new)
    }

    /// Begin a registration ceremony. Returns the request to pass to the
    /// client `u2f.register` call, and the challenge you must store against
    /// the session and supply again to `register_credential`.
    pub fn start_registration(&self) -> Result<(RegisterRequest, Challenge), U2fError>
    where
        T: U2fConfig,
    {
        let chal = self.generate_challenge()?;
        let req = RegisterRequest::new(&chal, self.config.get_app_id());
        Ok((req, chal))
    }

    /// Complete a registration ceremony by verifying the token's response
    /// against the outstanding challenge.
    ///
    /// On success returns the new `DeviceRegistration` for you to persist.
    /// On any failure no registration is produced and nothing is retried -
    /// re-prompting the user is caller policy.
    pub fn register_credential(
        &self,
        rsp: &RegisterResponse,
        chal: &Challenge,
    ) -> Result<DeviceRegistration, U2fError>
    where
        T: U2fConfig,
    {
        let client_data = self.validate_client_data(
            rsp.client_data.as_ref(),
            ClientDataType::Register,
            chal,
        )?;

        let reg_data = RegistrationData::try_from(rsp.registration_data.as_ref())?;

        // The registration layout the token signed:
        // 0x00 || app param || challenge param || key handle || public key
        let challenge_param = compute_sha256(client_data.raw_bytes());
        let r: [u8; 1] = [0x00];
        let verification_data: Vec<u8> = r
            .iter()
            .chain(self.app_param.iter())
            .chain(challenge_param.iter())
            .chain(reg_data.key_handle.iter())
            .chain(reg_data.user_public_key.iter())
            .copied()
            .collect();

        // Registration is attested by the certificate's key, not the
        // device key it conveys.
        let attestation_key = X509PublicKey::try_from(reg_data.attestation_cert.as_slice())?;
        attestation_key.assert_secp256r1()?;

        let verified = attestation_key.verify_signature(&reg_data.signature, &verification_data)?;
        if !verified {
            debug!("registration attestation signature failed to verify");
            return Err(U2fError::SignatureInvalid);
        }

        // Prove the conveyed device key is a usable P-256 point before
        // accepting the registration, so a bad key is caught at enrolment
        // rather than at first authentication.
        U2fPublicKey::try_from(reg_data.user_public_key.as_slice())?;

        Ok(DeviceRegistration::new(
            reg_data.key_handle,
            reg_data.user_public_key,
            reg_data.attestation_cert,
        ))
    }

    /// Begin an authentication ceremony for a registered device. Returns
    /// the request to pass to the client `u2f.sign` call, and the challenge
    /// you must store against the session and supply again to
    /// `authenticate_credential`.
    pub fn start_authentication(
        &self,
        device: &DeviceRegistration,
    ) -> Result<(SignRequest, Challenge), U2fError>
    where
        T: U2fConfig,
    {
        let chal = self.generate_challenge()?;
        let req = SignRequest::new(&chal, self.config.get_app_id(), device.key_handle.as_ref());
        Ok((req, chal))
    }

    /// Complete an authentication ceremony against a stored registration.
    ///
    /// The signature is validated strictly before the counter is trusted -
    /// until it verifies, the counter field is attacker controlled input.
    /// On success the device's counter has been advanced and the updated
    /// value is returned; you must persist the updated `device` before
    /// reporting success to the end user. On `CounterReplay` the device has
    /// been marked compromised - persist that too, and treat it as a
    /// security event rather than a failed login.
    pub fn authenticate_credential(
        &self,
        rsp: &SignResponse,
        chal: &Challenge,
        device: &mut DeviceRegistration,
    ) -> Result<Counter, U2fError>
    where
        T: U2fConfig,
    {
        let client_data = self.validate_client_data(
            rsp.client_data.as_ref(),
            ClientDataType::Authenticate,
            chal,
        )?;

        // A response for some other key handle than the record we were
        // asked to update is the same confusion class as a challenge
        // mismatch.
        if rsp.key_handle != device.key_handle {
            return Err(U2fError::MismatchedKeyHandle);
        }

        // A compromised device is rejected unconditionally - no amount of
        // valid signatures makes a possibly cloned key trustworthy again.
        if device.is_compromised() {
            return Err(U2fError::DeviceCompromised);
        }

        let sig_data = SignatureData::try_from(rsp.signature_data.as_ref())?;

        // The authentication layout the token signed:
        // app param || user presence || counter (be) || challenge param
        let challenge_param = compute_sha256(client_data.raw_bytes());
        let counter_bytes = sig_data.counter.to_be_bytes();
        let verification_data: Vec<u8> = self
            .app_param
            .iter()
            .chain([sig_data.user_presence].iter())
            .chain(counter_bytes.iter())
            .chain(challenge_param.iter())
            .copied()
            .collect();

        let device_key = U2fPublicKey::try_from(device.public_key.as_ref())?;
        let verified = device_key.verify_signature(&sig_data.signature, &verification_data)?;
        if !verified {
            debug!("assertion signature failed to verify");
            return Err(U2fError::SignatureInvalid);
        }

        device.check_and_update_counter(sig_data.counter)
    }

    // Shared client data checks: parse from the exact received bytes, then
    // require the ceremony type, the issued challenge, and (if configured)
    // the origin, in that order - protocol confusion is rejected before any
    // crypto work.
    fn validate_client_data(
        &self,
        raw: &[u8],
        expected_type: ClientDataType,
        chal: &Challenge,
    ) -> Result<ClientData, U2fError>
    where
        T: U2fConfig,
    {
        let client_data = ClientData::parse(raw.to_vec())?;

        if client_data.type_() != expected_type {
            debug!(
                "client data type {} != {}",
                client_data.type_().as_str(),
                expected_type.as_str()
            );
            return Err(U2fError::InvalidClientDataType);
        }

        if client_data.challenge().as_ref() != chal.as_ref() {
            return Err(U2fError::MismatchedChallenge);
        }

        if let Some(origin) = self.config.get_origin() {
            if client_data.origin() != origin {
                debug!("{} != {}", client_data.origin(), origin);
                return Err(U2fError::InvalidOrigin);
            }
        }

        Ok(client_data)
    }
}

/// The U2fConfig type allows site-specific customisation of the U2F
/// library. Your implementation supplies the relying party identity; the
/// library derives the application parameter hash from it.
pub trait U2fConfig {
    /// Returns the application id this relying party registers credentials
    /// against, typically your site's https URL. It is hashed into every
    /// signed byte layout, so changing it invalidates all existing
    /// registrations.
    fn get_app_id(&self) -> &str;

    /// The client origin to require in client data, if any. When this
    /// returns `Some`, responses whose client data carries a different
    /// origin fail with `InvalidOrigin`. Defaults to no origin checking,
    /// matching the reference protocol's relying party behaviour.
    fn get_origin(&self) -> Option<&str> {
        None
    }
}
