//! Integration tests for the otp-core frame layout.
//!
//! These tests read encoded frames the way the daemon does: by fixed byte
//! offsets into a C struct, without going through the crate's decoder.  A
//! change to the codec that still round-trips through `decode_request` but
//! moves a field would be caught here.

use otp_core::protocol::messages::{
    MAX_PASSCODE_LEN, REPLY_FRAME_SIZE, REQUEST_FRAME_SIZE, REQUEST_VERSION,
};
use otp_core::{
    decode_reply, encode_reply, encode_request, Credential, CredentialTag, Passcode, StatusCode,
    VerificationReply, VerificationRequest, VerifyPolicy,
};

/// Field view of a request frame, read at the daemon's struct offsets.
struct DaemonView {
    version: i32,
    username: String,
    challenge: String,
    tag: i32,
    pap_passcode: String,
    chap_challenge: Vec<u8>,
    chap_response: Vec<u8>,
    allow_sync: i32,
    allow_async: i32,
    challenge_delay: i32,
    resync: i32,
}

fn int_at(frame: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes(frame[offset..offset + 4].try_into().unwrap())
}

fn size_at(frame: &[u8], offset: usize) -> usize {
    u64::from_ne_bytes(frame[offset..offset + 8].try_into().unwrap()) as usize
}

fn c_string_at(frame: &[u8], offset: usize, capacity: usize) -> String {
    let field = &frame[offset..offset + capacity];
    assert_eq!(field[capacity - 1], 0, "last byte of field at {offset} must be NUL");
    let end = field.iter().position(|&b| b == 0).unwrap();
    String::from_utf8(field[..end].to_vec()).unwrap()
}

fn daemon_view(frame: &[u8]) -> DaemonView {
    assert_eq!(frame.len(), REQUEST_FRAME_SIZE);
    let tag = int_at(frame, 56);
    let (pap_passcode, chap_challenge, chap_response) = match tag {
        1 => (c_string_at(frame, 64, 48), Vec::new(), Vec::new()),
        3 | 5 | 7 => {
            let clen = size_at(frame, 80);
            let rlen = size_at(frame, 144);
            (
                String::new(),
                frame[64..64 + clen].to_vec(),
                frame[88..88 + rlen].to_vec(),
            )
        }
        _ => (String::new(), Vec::new(), Vec::new()),
    };
    DaemonView {
        version: int_at(frame, 0),
        username: c_string_at(frame, 4, 32),
        challenge: c_string_at(frame, 36, 17),
        tag,
        pap_passcode,
        chap_challenge,
        chap_response,
        allow_sync: int_at(frame, 152),
        allow_async: int_at(frame, 156),
        challenge_delay: int_at(frame, 160),
        resync: int_at(frame, 164),
    }
}

#[test]
fn test_pap_request_matches_daemon_struct() {
    let request = VerificationRequest::new(
        "alice",
        "",
        Credential::pap("1234567").expect("pap"),
        VerifyPolicy {
            allow_sync: true,
            allow_async: false,
            challenge_delay: 30,
            resync: true,
        },
    )
    .expect("request");

    let view = daemon_view(&encode_request(&request));

    assert_eq!(view.version, REQUEST_VERSION);
    assert_eq!(view.username, "alice");
    assert_eq!(view.challenge, "");
    assert_eq!(view.tag, 1);
    assert_eq!(view.pap_passcode, "1234567");
    assert_eq!(view.allow_sync, 1);
    assert_eq!(view.allow_async, 0);
    assert_eq!(view.challenge_delay, 30);
    assert_eq!(view.resync, 1);
}

#[test]
fn test_challenge_delay_is_a_signed_int_on_the_wire() {
    let request = VerificationRequest::new(
        "alice",
        "",
        Credential::pap("1").expect("pap"),
        VerifyPolicy {
            challenge_delay: i32::MAX,
            ..VerifyPolicy::default()
        },
    )
    .expect("request");

    let view = daemon_view(&encode_request(&request));

    assert_eq!(view.challenge_delay, i32::MAX);
}

#[test]
fn test_ms_chap_request_matches_daemon_struct() {
    let challenge = [0x11u8; 8];
    let response: Vec<u8> = (0..50).collect();
    let request = VerificationRequest::new(
        "bob",
        "12345678",
        Credential::ms_chap(&challenge, &response).expect("ms-chap"),
        VerifyPolicy {
            allow_sync: false,
            allow_async: true,
            challenge_delay: 0,
            resync: false,
        },
    )
    .expect("request");

    let view = daemon_view(&encode_request(&request));

    assert_eq!(view.tag, CredentialTag::MsChap as i32);
    assert_eq!(view.challenge, "12345678");
    assert_eq!(view.chap_challenge, challenge);
    assert_eq!(view.chap_response, response);
    assert_eq!(view.allow_sync, 0);
    assert_eq!(view.allow_async, 1);
    assert_eq!(view.resync, 0);
}

#[test]
fn test_reply_written_by_daemon_decodes() {
    // Build the reply the way the daemon's C code would: zeroed struct,
    // fields assigned in place.
    let mut frame = vec![0u8; REPLY_FRAME_SIZE];
    frame[0..4].copy_from_slice(&1i32.to_ne_bytes());
    frame[4..8].copy_from_slice(&(StatusCode::Ok as i32).to_ne_bytes());
    frame[8..15].copy_from_slice(b"1234567");

    let reply = decode_reply(&frame).expect("valid reply");

    assert_eq!(reply.status, StatusCode::Ok);
    assert_eq!(reply.passcode.expose(), "1234567");
}

#[test]
fn test_encoded_reply_passcode_field_is_terminated() {
    let reply = VerificationReply {
        status: StatusCode::Ok,
        passcode: Passcode::new("8".repeat(MAX_PASSCODE_LEN)).expect("fits"),
    };

    let frame = encode_reply(&reply);

    assert_eq!(frame[8 + MAX_PASSCODE_LEN], 0);
    assert_eq!(decode_reply(&frame).expect("decode"), reply);
}
