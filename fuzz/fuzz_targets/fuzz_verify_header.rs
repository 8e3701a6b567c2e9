#![no_main]

//! Fuzz target for Authorization header parsing and token verification.
//!
//! Arbitrary header values must come back as a typed error or an identity,
//! never a panic, whatever the scheme, whitespace or token bytes look like.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ticketdesk::auth::CredentialVerifier;

#[derive(Arbitrary, Debug)]
struct HeaderInput {
    scheme: String,
    token: String,
    separator: u8,
}

fuzz_target!(|input: HeaderInput| {
    let verifier = CredentialVerifier::new(b"fuzz-secret");

    let sep = match input.separator % 3 {
        0 => " ",
        1 => "\t",
        _ => "   ",
    };
    let header = format!("{}{}{}", input.scheme, sep, input.token);

    let _ = verifier.verify(&header);
    let _ = verifier.verify(&input.token);
    let _ = verifier.verify_token(&input.token);
});
