//! Cryptographic operation wrapper for U2F. This module exists to allow
//! ease of auditing, safe operation wrappers for the library, and
//! cryptographic provider abstraction. This module currently uses OpenSSL
//! as the cryptographic primitive provider.

use openssl::{bn, ec, hash, nid, pkey, rand, sha, sign, x509};
use std::convert::TryFrom;

use crate::constants::{CHALLENGE_SIZE_BYTES, PUBLIC_KEY_SIZE_BYTES, UNCOMPRESSED_POINT_TAG};
use crate::error::U2fError;

// Why OpenSSL over another rust crate?
// - The openssl crate allows us to reconstruct a public key from raw
//   group coordinates, where most others want a pkcs formatted structure.
//   U2F tokens transmit their keys as bare 65 byte uncompressed points, so
//   this is exactly the operation we need, and openssl has the resources
//   and investment into its maintenance to have confidence in it.

/// Something that can verify an ECDSA-P256-SHA256 signature over a byte
/// layout. The ceremonies never care whether the key came from an
/// attestation certificate or from a stored raw point - only that it can
/// check a signature.
pub trait SignatureVerifier {
    /// Verify `signature` over `verification_data`. Cryptographic rejection,
    /// including unparseable signature DER, is `Ok(false)` - an adversarial
    /// or buggy token is an expected input, not a provider fault.
    fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> Result<bool, U2fError>;
}

fn verify_with_pkey(
    pkey: &pkey::PKey<pkey::Public>,
    signature: &[u8],
    verification_data: &[u8],
) -> Result<bool, U2fError> {
    let mut verifier = sign::Verifier::new(hash::MessageDigest::sha256(), pkey)?;
    verifier.update(verification_data)?;
    // OpenSSL reports garbage signature DER as an error stack rather than
    // a failed check. Both are a rejection here.
    Ok(verifier.verify(signature).unwrap_or(false))
}

/// An X509PublicKey. This is what is otherwise known as a public certificate
/// which comprises a public key and other signed metadata related to the
/// issuer of the key. For U2F this is the token's attestation certificate.
pub struct X509PublicKey {
    pubk: x509::X509,
}

impl std::fmt::Debug for X509PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "X509PublicKey")
    }
}

impl TryFrom<&[u8]> for X509PublicKey {
    type Error = U2fError;

    // Must be DER bytes. If you have PEM, base64decode first!
    fn try_from(d: &[u8]) -> Result<Self, Self::Error> {
        let pubk = x509::X509::from_der(d).map_err(|_| U2fError::MalformedPublicKey)?;
        Ok(X509PublicKey { pubk })
    }
}

impl X509PublicKey {
    /// Assert that the certificate's key is an EC key on P-256. U2F
    /// attestation keys are required to be on this curve; anything else is
    /// a malformed key, not a policy decision.
    pub(crate) fn assert_secp256r1(&self) -> Result<(), U2fError> {
        let pk = self
            .pubk
            .public_key()
            .map_err(|_| U2fError::MalformedPublicKey)?;

        let ec_key = pk.ec_key().map_err(|_| U2fError::MalformedPublicKey)?;

        ec_key
            .check_key()
            .map_err(|_| U2fError::MalformedPublicKey)?;

        let ec_curve = ec_key
            .group()
            .curve_name()
            .ok_or(U2fError::MalformedPublicKey)?;

        if ec_curve != nid::Nid::X9_62_PRIME256V1 {
            return Err(U2fError::MalformedPublicKey);
        }
        Ok(())
    }
}

impl SignatureVerifier for X509PublicKey {
    fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> Result<bool, U2fError> {
        let pkey = self.pubk.public_key()?;
        verify_with_pkey(&pkey, signature, verification_data)
    }
}

/// A device public key reconstructed from the raw 65 byte uncompressed
/// point format (`0x04 || X || Y`) that U2F tokens transmit at registration.
pub struct U2fPublicKey {
    pkey: pkey::PKey<pkey::Public>,
}

impl std::fmt::Debug for U2fPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "U2fPublicKey")
    }
}

impl TryFrom<&[u8]> for U2fPublicKey {
    type Error = U2fError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        if raw.len() != PUBLIC_KEY_SIZE_BYTES || raw[0] != UNCOMPRESSED_POINT_TAG {
            return Err(U2fError::MalformedPublicKey);
        }

        let ec_group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1)?;

        let xbn = bn::BigNum::from_slice(&raw[1..33]).map_err(|_| U2fError::MalformedPublicKey)?;
        let ybn = bn::BigNum::from_slice(&raw[33..65]).map_err(|_| U2fError::MalformedPublicKey)?;

        let ec_key = ec::EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)
            .map_err(|_| U2fError::MalformedPublicKey)?;

        // Checks the coordinates are actually a point on the curve.
        ec_key.check_key().map_err(|_| U2fError::MalformedPublicKey)?;

        let pkey = pkey::PKey::from_ec_key(ec_key)?;

        Ok(U2fPublicKey { pkey })
    }
}

impl U2fPublicKey {
    /// Re-encode this key to the 65 byte uncompressed point format.
    pub fn to_raw(&self) -> Result<Vec<u8>, U2fError> {
        let ec_group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1)?;
        let mut ctx = bn::BigNumContext::new()?;
        self.pkey
            .ec_key()?
            .public_key()
            .to_bytes(&ec_group, ec::PointConversionForm::UNCOMPRESSED, &mut ctx)
            .map_err(U2fError::OpenSSLError)
    }
}

impl SignatureVerifier for U2fPublicKey {
    fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> Result<bool, U2fError> {
        verify_with_pkey(&self.pkey, signature, verification_data)
    }
}

/// Generate `CHALLENGE_SIZE_BYTES` of cryptographically secure random data.
/// There is no fallback source - if the provider's CSPRNG fails, that is
/// fatal.
pub(crate) fn secure_random_challenge() -> Result<Vec<u8>, U2fError> {
    let mut buf = vec![0; CHALLENGE_SIZE_BYTES];
    rand::rand_bytes(&mut buf).map_err(|_| U2fError::CryptoUnavailable)?;
    Ok(buf)
}

pub(crate) fn compute_sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = sha::Sha256::new();
    hasher.update(data);
    hasher.finish().to_vec()
}
