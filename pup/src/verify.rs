//! Pluggable signature verification.
//!
//! The decoder never verifies signatures itself. Signed segments and blocks
//! are handed to a [`SignatureVerifier`]; the default [`NoVerifier`] accepts
//! everything and reports it as [`VerifyStatus::Unverified`], so extracted
//! data always carries an honest status.

use crate::Result;
use crate::segment::Digest;

/// Verification outcome attached to extracted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    /// Nothing along the extraction path was signed.
    NotSigned,
    /// Signed data was seen but not verified.
    Unverified,
    /// Every signed input was verified by the installed verifier.
    Passed,
}

impl VerifyStatus {
    /// Combine two statuses: `NotSigned` is the identity, and any
    /// `Unverified` input taints the result.
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::NotSigned, s) | (s, Self::NotSigned) => s,
            (Self::Passed, Self::Passed) => Self::Passed,
            _ => Self::Unverified,
        }
    }
}

/// Verifier for signed segments and blocks.
///
/// `data` is the raw (still encrypted/compressed) input; `digest` is the
/// block's digest record when the info segment carries one.
pub trait SignatureVerifier {
    fn verify(&self, data: &[u8], digest: Option<&Digest>) -> Result<VerifyStatus>;
}

/// Default verifier: performs no verification and says so.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVerifier;

impl SignatureVerifier for NoVerifier {
    fn verify(&self, _data: &[u8], _digest: Option<&Digest>) -> Result<VerifyStatus> {
        Ok(VerifyStatus::Unverified)
    }
}
