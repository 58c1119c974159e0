// Outbound frame encoding for both wire modes.

use base64::Engine;
use meeting_copilot::transport::{encode_audio, OutboundFrame, WireFormat, WIRE_SAMPLE_RATE};
use tokio_tungstenite::tungstenite::Message;

#[test]
fn binary_pcm_passes_bytes_through() {
    let pcm = vec![0x01, 0x02, 0xff, 0x7f];
    match encode_audio(&pcm, WireFormat::BinaryPcm) {
        Message::Binary(bytes) => assert_eq!(bytes, pcm),
        other => panic!("expected binary frame, got {:?}", other),
    }
}

#[test]
fn json_base64_wraps_audio_in_the_append_envelope() {
    let pcm = vec![0x10, 0x20, 0x30];
    let Message::Text(text) = encode_audio(&pcm, WireFormat::JsonBase64) else {
        panic!("expected text frame");
    };

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "input_audio_buffer.append");
    assert_eq!(value["format"], "pcm16");
    assert_eq!(value["sample_rate_hz"], WIRE_SAMPLE_RATE);

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value["audio"].as_str().unwrap())
        .unwrap();
    assert_eq!(decoded, pcm);
}

#[test]
fn text_frames_ignore_the_wire_format() {
    for wire in [WireFormat::BinaryPcm, WireFormat::JsonBase64] {
        match OutboundFrame::Text("ping".to_string()).into_message(wire) {
            Message::Text(text) => assert_eq!(text, "ping"),
            other => panic!("expected text frame, got {:?}", other),
        }
    }
}

#[test]
fn wire_format_is_a_config_time_choice() {
    // Deserializes from config exactly as written there.
    assert_eq!(
        serde_json::from_str::<WireFormat>(r#""binary_pcm""#).unwrap(),
        WireFormat::BinaryPcm
    );
    assert_eq!(
        serde_json::from_str::<WireFormat>(r#""json_base64""#).unwrap(),
        WireFormat::JsonBase64
    );
    assert_eq!(WireFormat::default(), WireFormat::BinaryPcm);
}
