//! Cryptographic test vectors from official specifications.
//!
//! - RFC 7748 (X25519)
//! - BLAKE3 official test vectors

use archipel_crypto::hash;
use archipel_crypto::x25519::{PrivateKey, PublicKey};

#[test]
fn x25519_rfc7748_dh_vector_1() {
    // RFC 7748 Section 5.2 - Test Vector 1 (scalar multiplication)
    let scalar_bytes = [
        0xa5, 0x46, 0xe3, 0x6b, 0xf0, 0x52, 0x7c, 0x9d, 0x3b, 0x16, 0x15, 0x4b, 0x82, 0x46, 0x5e,
        0xdd, 0x62, 0x14, 0x4c, 0x0a, 0xc1, 0xfc, 0x5a, 0x18, 0x50, 0x6a, 0x22, 0x44, 0xba, 0x44,
        0x9a, 0xc4,
    ];
    let basepoint_bytes = [
        0xe6, 0xdb, 0x68, 0x67, 0x58, 0x30, 0x30, 0xdb, 0x35, 0x94, 0xc1, 0xa4, 0x24, 0xb1, 0x5f,
        0x7c, 0x72, 0x66, 0x24, 0xec, 0x26, 0xb3, 0x35, 0x3b, 0x10, 0xa9, 0x03, 0xa6, 0xd0, 0xab,
        0x1c, 0x4c,
    ];
    let expected = [
        0xc3, 0xda, 0x55, 0x37, 0x9d, 0xe9, 0xc6, 0x90, 0x8e, 0x94, 0xea, 0x4d, 0xf2, 0x8d, 0x08,
        0x4f, 0x32, 0xec, 0xcf, 0x03, 0x49, 0x1c, 0x71, 0xf7, 0x54, 0xb4, 0x07, 0x55, 0x77, 0xa2,
        0x85, 0x52,
    ];

    // from_bytes bypasses clamping so the raw scalar is used, matching the
    // RFC vector exactly.
    let private = PrivateKey::from_bytes(scalar_bytes);
    let public = PublicKey::from_bytes(basepoint_bytes);
    let shared = private.exchange(&public).unwrap();

    assert_eq!(shared.as_bytes(), &expected);
}

#[test]
fn x25519_shared_secret_is_symmetric() {
    use rand_core::OsRng;

    let alice = PrivateKey::generate(&mut OsRng);
    let bob = PrivateKey::generate(&mut OsRng);

    let alice_shared = alice.exchange(&bob.public_key()).expect("DH exchange failed");
    let bob_shared = bob.exchange(&alice.public_key()).expect("DH exchange failed");

    assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
}

#[test]
fn blake3_empty_string_vector() {
    let hash_output = hash::hash(b"");
    let expected = [
        0xaf, 0x13, 0x49, 0xb9, 0xf5, 0xf9, 0xa1, 0xa6, 0xa0, 0x40, 0x4d, 0xea, 0x36, 0xdc, 0xc9,
        0x49, 0x9b, 0xcb, 0x25, 0xc9, 0xad, 0xc1, 0x12, 0xb7, 0xcc, 0x9a, 0x93, 0xca, 0xe4, 0x1f,
        0x32, 0x62,
    ];
    assert_eq!(hash_output, expected);
}

#[test]
fn blake3_is_deterministic() {
    assert_eq!(hash::hash(b"archipel"), hash::hash(b"archipel"));
    assert_ne!(hash::hash(b"archipel"), hash::hash(b"archipel2"));
}
