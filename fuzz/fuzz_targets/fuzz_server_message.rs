#![no_main]

use libfuzzer_sys::fuzz_target;
use tictactoe_room_client::protocol::ServerMessage;
use tictactoe_room_client::SessionEvent;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ServerMessage>(data);

    // Anything that decodes must convert and re-encode cleanly.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ServerMessage>(s) {
            let _ = serde_json::to_string(&msg);
            let _ = SessionEvent::from(msg);
        }
    }
});
