//! Secrets and how a connection proves it holds one.
//!
//! Partyline has no accounts. When a device starts or joins a game it is
//! handed an endpoint id and a secret; later, when it opens its socket, it
//! offers `"Secret" + secret` as the first WebSocket sub-protocol. Browsers
//! can't set arbitrary headers on a WebSocket upgrade, but they can set
//! sub-protocols, which is why the secret travels there.

use std::fmt;

use subtle::ConstantTimeEq;

use crate::SessionError;

/// Prefix that marks the first offered sub-protocol as a secret.
pub const SECRET_PREFIX: &str = "Secret";

/// An endpoint secret.
///
/// Comparison goes through [`Secret::matches`], which never short-circuits
/// on the first differing byte. There is no `PartialEq`, so `==` can't be
/// used on secrets. `Debug` is redacted so secrets don't leak into logs
/// through `?` formatting.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns `true` if `alleged` equals this secret.
    ///
    /// Runs in time independent of how many leading bytes match, so an
    /// attacker timing failed binds learns nothing about the real secret.
    /// Secrets have a fixed, public length; a length mismatch is rejected
    /// without comparing contents.
    pub fn matches(&self, alleged: &str) -> bool {
        self.0.as_bytes().ct_eq(alleged.as_bytes()).into()
    }

    /// The raw secret, for handing back to the device it was issued to.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Extracts the secret from the sub-protocols offered in a handshake.
///
/// Only the *first* offered value is considered, and it must begin with
/// [`SECRET_PREFIX`]; whatever follows the prefix is the secret.
///
/// # Errors
/// - [`SessionError::MissingSecret`]: nothing was offered
/// - [`SessionError::MalformedSecret`]: the first value lacks the prefix
pub fn secret_from_protocols<S: AsRef<str>>(
    protocols: &[S],
) -> Result<Secret, SessionError> {
    let first = protocols.first().ok_or(SessionError::MissingSecret)?;
    first
        .as_ref()
        .strip_prefix(SECRET_PREFIX)
        .map(Secret::new)
        .ok_or(SessionError::MalformedSecret)
}
