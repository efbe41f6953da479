//! Room codes, endpoint ids, and secrets.
//!
//! All three come from `rand::rng()`, the thread-local generator, which is
//! a CSPRNG seeded from the OS. Room codes are short enough to read off a
//! TV across the living room, so anyone who could predict the next one
//! could walk into a stranger's game; ids and secrets must be unguessable
//! for the same reason.

use rand::Rng;

use crate::Secret;

/// Characters a room code is drawn from.
///
/// No vowels (so codes never spell words, rude or otherwise), and none of
/// `0`, `1`, or `L`, which are easily confused with `O`, `I`, and each
/// other on a shared screen. `Y` stays; it reads as a consonant often
/// enough that dropping it would only shrink the code space.
pub const ROOM_CODE_ALPHABET: &[u8] = b"23456789BCDFGHJKMNPQRSTVWXYZ";

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 4;

/// Length of an endpoint id.
pub const PERSONAL_ID_LEN: usize = 12;

/// Length of an endpoint secret (~186 bits of entropy).
pub const PERSONAL_SECRET_LEN: usize = 36;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a 4-character uppercase room code.
///
/// Not unique on its own: the registry retries until the code doesn't
/// collide with a live room.
pub fn generate_room_code() -> String {
    random_string(ROOM_CODE_ALPHABET, ROOM_CODE_LEN)
}

/// Generates a 12-character base-36 endpoint id.
pub fn generate_personal_id() -> String {
    random_string(BASE36_ALPHABET, PERSONAL_ID_LEN)
}

/// Generates a 36-character base-36 endpoint secret.
pub fn generate_personal_secret() -> Secret {
    Secret::new(random_string(BASE36_ALPHABET, PERSONAL_SECRET_LEN))
}

/// Draws `len` characters uniformly from `alphabet`.
///
/// `random_range` rejects out-of-range samples instead of taking a modulo,
/// so every character is equally likely.
fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}
