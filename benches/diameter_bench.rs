#![feature(test)]

extern crate test;
use diameter_core::avp::Avp;
use diameter_core::diameter::{CommandFlags, DiameterHeader, DiameterMessage};
use diameter_core::dictionary::Dictionary;
use std::io::Cursor;
use test::black_box;
use test::Bencher;

#[bench]
fn bench_decode_header(b: &mut Bencher) {
    let data = test_data();
    b.iter(|| {
        let mut cursor = Cursor::new(data);
        black_box(DiameterHeader::decode_from(&mut cursor).unwrap())
    });
}

#[bench]
fn bench_encode_header(b: &mut Bencher) {
    let data = test_data();
    let mut cursor = Cursor::new(data);
    let header = DiameterHeader::decode_from(&mut cursor).unwrap();

    let mut encoded = Vec::new();
    b.iter(|| {
        encoded.clear();
        black_box(header.encode_to(&mut encoded).unwrap());
    });
}

#[bench]
fn bench_decode_message(b: &mut Bencher) {
    let dict = Dictionary::new_default();

    let data = test_data_2();
    b.iter(|| {
        let mut cursor = Cursor::new(data);
        black_box(DiameterMessage::decode_from(&mut cursor, &dict).unwrap())
    });
}

#[bench]
fn bench_encode_message(b: &mut Bencher) {
    let dict = Dictionary::new_default();

    let data = test_data_2();
    let mut cursor = Cursor::new(data);
    let message = DiameterMessage::decode_from(&mut cursor, &dict).unwrap();

    let mut encoded = Vec::new();
    b.iter(|| {
        encoded.clear();
        black_box(message.encode_to(&mut encoded).unwrap());
    });
}

#[bench]
fn bench_decode_ccr(b: &mut Bencher) {
    let dict = Dictionary::new_default();

    let message = ccr_message();
    let mut data = Vec::new();
    message.encode_to(&mut data).unwrap();

    b.iter(|| {
        let mut cursor = Cursor::new(&data);
        black_box(DiameterMessage::decode_from(&mut cursor, &dict).unwrap())
    });
}

#[bench]
fn bench_encode_ccr(b: &mut Bencher) {
    let message = ccr_message();
    let mut encoded = Vec::new();
    b.iter(|| {
        encoded.clear();
        black_box(message.encode_to(&mut encoded).unwrap());
    });
}

fn test_data() -> &'static [u8] {
    &[
        0x01, 0x00, 0x00, 0x14, // version, length
        0x80, 0x00, 0x01, 0x10, // flags, code
        0x00, 0x00, 0x00, 0x04, // application_id
        0x00, 0x00, 0x00, 0x03, // hop_by_hop_id
        0x00, 0x00, 0x00, 0x04, // end_to_end_id
    ]
}

fn test_data_2() -> &'static [u8] {
    &[
        0x01, 0x00, 0x00, 0x34, // version, length
        0x80, 0x00, 0x01, 0x10, // flags, code
        0x00, 0x00, 0x00, 0x04, // application_id
        0x00, 0x00, 0x00, 0x03, // hop_by_hop_id
        0x00, 0x00, 0x00, 0x04, // end_to_end_id
        0x00, 0x00, 0x01, 0x9F, // avp code
        0x40, 0x00, 0x00, 0x0C, // flags, length
        0x00, 0x00, 0x04, 0xB0, // value
        0x00, 0x00, 0x00, 0x1E, // avp code
        0x00, 0x00, 0x00, 0x12, // flags, length
        0x66, 0x6F, 0x6F, 0x62, // value
        0x61, 0x72, 0x31, 0x32, // value
        0x33, 0x34, 0x00, 0x00,
    ]
}

/// A representative request: a Credit-Control-Request-shaped message
/// with a nested grouped AVP, exercising the same decode/encode paths
/// a routed auth/acct request would.
fn ccr_message() -> DiameterMessage {
    let mut message = DiameterMessage::new(272, 4, CommandFlags::request(), 1123158610, 3102381851);

    message.add_avp(Avp::new_identity(264, None, true, "host.example.com"));
    message.add_avp(Avp::new_identity(296, None, true, "realm.example.com"));
    message.add_avp(Avp::new_utf8string(263, None, true, "ses;12345888"));
    message.add_avp(Avp::new_enumerated(416, None, true, 1));
    message.add_avp(Avp::new_unsigned32(415, None, true, 1000));

    let ps_information = Avp::new_grouped(874, None, true, vec![Avp::new_utf8string(30, None, true, "10999")]);
    let service_information = Avp::new_grouped(873, Some(10415), true, vec![ps_information]);
    message.add_avp(service_information);

    message
}

fn main() {}
