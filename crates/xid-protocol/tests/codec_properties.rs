//! Property tests for the XID response codec and device catalog
//!
//! These tests verify:
//! - Encoded response packets decode back to the same fields
//! - Partial packets are never consumed or reported as malformed
//! - A garbage byte is skipped before a valid packet is decoded
//! - Catalog lookups return exactly the requested identity

use proptest::prelude::*;
use xid_protocol::{
    encode_response, ConfigTable, Decoded, PacketFormat, ProtocolCodec, Response, ResponseCodec,
};

// ============================================================================
// Strategies
// ============================================================================

fn packet_format() -> impl Strategy<Value = PacketFormat> {
    prop_oneof![
        Just(PacketFormat::Xid),
        Just(PacketFormat::XidSevenByte),
        Just(PacketFormat::StimTracker2),
    ]
}

/// Responses representable in the given format
fn response_for(format: PacketFormat) -> impl Strategy<Value = Response> {
    // XID info bytes carry a 3-bit port (bit 3 means invalid) and a 3-bit key
    let (max_port, max_key) = match format {
        PacketFormat::StimTracker2 => (u8::MAX, u8::MAX),
        _ => (7, 7),
    };
    (0..=max_port, 0..=max_key, any::<bool>(), any::<u32>()).prop_map(
        |(port, key, pressed, reaction_time_ms)| Response {
            port,
            key,
            pressed,
            reaction_time_ms,
        },
    )
}

fn format_and_response() -> impl Strategy<Value = (PacketFormat, Response)> {
    packet_format().prop_flat_map(|format| (Just(format), response_for(format)))
}

fn garbage_byte(format: PacketFormat) -> impl Strategy<Value = u8> {
    any::<u8>().prop_filter("must not be a lead byte", move |b| *b != format.lead_byte())
}

// ============================================================================
// Codec Properties
// ============================================================================

proptest! {
    #[test]
    fn encoded_response_decodes_to_same_fields((format, response) in format_and_response()) {
        let mut codec = ResponseCodec::new(format);
        codec.push_bytes(&encode_response(format, &response));
        prop_assert_eq!(codec.decode(), Decoded::Frame(response));
        prop_assert_eq!(codec.pending(), 0);
    }

    #[test]
    fn strict_prefix_is_incomplete(
        (format, response) in format_and_response(),
        cut in 1usize..9,
    ) {
        let bytes = encode_response(format, &response);
        let cut = cut.min(bytes.len() - 1);
        let mut codec = ResponseCodec::new(format);
        codec.push_bytes(&bytes[..cut]);

        prop_assert_eq!(
            codec.decode(),
            Decoded::Incomplete { needed: bytes.len() - cut }
        );
        prop_assert_eq!(codec.pending(), cut);

        // Completing the frame yields the response
        codec.push_bytes(&bytes[cut..]);
        prop_assert_eq!(codec.decode(), Decoded::Frame(response));
    }

    #[test]
    fn garbage_then_frame(
        (format, response, junk) in format_and_response()
            .prop_flat_map(|(f, r)| (Just(f), Just(r), garbage_byte(f)))
    ) {
        let mut codec = ResponseCodec::new(format);
        codec.push_bytes(&[junk]);
        codec.push_bytes(&encode_response(format, &response));

        prop_assert_eq!(codec.decode(), Decoded::Malformed { skipped: junk });
        prop_assert_eq!(codec.decode(), Decoded::Frame(response));
    }

    #[test]
    fn byte_at_a_time_feeding(responses in prop::collection::vec(response_for(PacketFormat::Xid), 1..8)) {
        let mut codec = ResponseCodec::new(PacketFormat::Xid);
        let mut decoded = Vec::new();
        for response in &responses {
            for byte in encode_response(PacketFormat::Xid, response) {
                codec.push_bytes(&[byte]);
                if let Some(r) = codec.next_frame() {
                    decoded.push(r);
                }
            }
        }
        prop_assert_eq!(decoded, responses);
    }
}

// ============================================================================
// Catalog Properties
// ============================================================================

proptest! {
    #[test]
    fn lookup_returns_exact_identity(index in 0usize..64) {
        let table = ConfigTable::builtin();
        let entries: Vec<_> = table.iter().cloned().collect();
        let config = &entries[index % entries.len()];
        let (product, model, major) = config.identity();

        let found = table.lookup(product, model, major).unwrap();
        prop_assert_eq!(found.identity(), (product, model, major));
        prop_assert_eq!(found.name(), config.name());
    }

    #[test]
    fn lookup_never_matches_other_major(index in 0usize..64, major in 3u8..10) {
        let table = ConfigTable::builtin();
        let entries: Vec<_> = table.iter().cloned().collect();
        let (product, model, _) = entries[index % entries.len()].identity();
        prop_assert!(table.lookup(product, model, major).is_err());
    }
}
