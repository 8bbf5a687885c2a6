// crates/rkvision-media/src/dashboard.rs
//
// Static HTML surfaces: the per-channel index page and the `/multi`
// dashboard enumerating every fixed channel's stream.

use rkvision_core::constants::{FIXED_CHANNEL_BASE_PORT, FIXED_CHANNEL_COUNT};

pub fn index_html(port: u16) -> String {
    format!(
        "<!doctype html><html><head><title>rkvision channel {port}</title></head>\
<body style=\"background:#111;color:#eee;font-family:monospace\">\
<h3>rkvision — channel on port {port}</h3>\
<img src=\"/mjpeg\" style=\"max-width:100%\"/>\
<p><a href=\"/stats\" style=\"color:#8cf\">/stats</a></p>\
</body></html>"
    )
}

pub fn dashboard_html() -> String {
    let mut tiles = String::new();
    for i in 0..FIXED_CHANNEL_COUNT {
        let port = FIXED_CHANNEL_BASE_PORT + i as u16;
        tiles.push_str(&format!(
            "<div style=\"display:inline-block;margin:4px\">\
<div style=\"color:#8cf;font-size:12px\">ch{i} :{port}</div>\
<img src=\"http://127.0.0.1:{port}/mjpeg\" width=\"320\"/>\
</div>"
        ));
    }
    format!(
        "<!doctype html><html><head><title>rkvision multi-channel</title></head>\
<body style=\"background:#111;color:#eee;font-family:monospace\">\
<h3>rkvision — {FIXED_CHANNEL_COUNT} channels</h3>{tiles}</body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_lists_every_fixed_channel_port() {
        let html = dashboard_html();
        for i in 0..FIXED_CHANNEL_COUNT {
            let port = FIXED_CHANNEL_BASE_PORT + i as u16;
            assert!(html.contains(&port.to_string()));
        }
    }
}
